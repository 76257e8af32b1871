/*!
 * Device client traits.
 *
 * The bridge does not speak the device wire protocol itself. A device client
 * performs discovery, handshake and encryption, and hands back a session
 * through which properties are read, commands are issued and pushed
 * changes are received.
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use mibridge_core::types::Value;

use crate::device::{DeviceEvent, Result};
use crate::discovery::DiscoveryOptions;

/// A live, authenticated connection to one device
#[async_trait]
pub trait DeviceSession: Send + Sync + Debug {
    /// Model string the device reported during the handshake
    fn model(&self) -> &str;

    /// Network address of the device
    fn address(&self) -> &str;

    /// Last value the client holds for a property, if any
    fn property(&self, name: &str) -> Option<Value>;

    /// Snapshot of every property the client holds
    fn properties(&self) -> HashMap<String, Value>;

    /// Switch the device on or off
    async fn set_power(&self, on: bool) -> Result<()>;

    /// Change the operating mode
    async fn set_mode(&self, mode: &str) -> Result<()>;

    /// Read the favorite-mode fan level (0..=16) from the device
    async fn favorite_level(&self) -> Result<u8>;

    /// Set the favorite-mode fan level (0..=16)
    async fn set_favorite_level(&self, level: u8) -> Result<()>;

    /// Invoke a device method with positional arguments
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Subscribe to property changes pushed by the device
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;
}

/// Establishes sessions with devices
#[async_trait]
pub trait DeviceClient: Send + Sync + Debug {
    /// Get the client name
    fn name(&self) -> &'static str;

    /// Connect to the device described by `options`
    async fn connect(&self, options: &DiscoveryOptions) -> Result<Arc<dyn DeviceSession>>;
}
