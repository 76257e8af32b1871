/*!
 * mibridge Accessory
 *
 * This crate turns a device session into an accessory the host can drive:
 * services and characteristic bindings per device profile, the accessors
 * that translate reads and writes into device commands, and the event
 * bridge that keeps characteristics in step with pushed property changes.
 */

#![warn(missing_docs)]

pub mod accessory;
pub mod bridge;
pub mod characteristic;
pub mod context;
pub mod convert;
pub mod error;
pub mod profiles;
pub mod registry;
pub mod service;
pub mod state;

pub use accessory::Accessory;
pub use characteristic::{CharacteristicId, CharacteristicUpdate};
pub use error::{AccessoryError, Result};
pub use registry::{AccessoryRegistry, RegistryEvent};
pub use service::{Service, ServiceKind};

/// mibridge accessory crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
