/*!
 * mibridge core
 *
 * This crate provides the shared foundation of the bridge: configuration,
 * the typed event bus, logging setup and the dynamic value type exchanged
 * with devices and the host.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use chrono;
    pub use serde;
    pub use tokio;
    pub use tracing;
    pub use uuid;
}

/// mibridge core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
