/*!
 * mibridge Devices
 *
 * This crate provides the device side of the bridge: the client and session
 * traits a device transport implements, discovery with fixed-delay retry,
 * the session manager that owns one live session per accessory, and a
 * simulated client.
 */

#![warn(missing_docs)]

// Re-export core types
pub use mibridge_core::prelude;

pub mod device;
pub mod devices;
pub mod discovery;
pub mod profile;
pub mod protocol;
pub mod session;

pub use device::{DeviceError, DeviceEvent, DeviceState};
pub use discovery::{discover_once, DiscoveryOptions, RetryPolicy};
pub use profile::{DeviceKind, DeviceProfile};
pub use protocol::{DeviceClient, DeviceSession};
pub use session::{DiscoveryHook, SessionManager};

/// mibridge devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

