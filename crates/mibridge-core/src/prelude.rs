/*!
 * Prelude module for mibridge core.
 *
 * This module re-exports commonly used types and functions from the core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{DeviceKind, Id, Value};

// Re-export event types
pub use crate::event::{EventBus, EventReceiver, SharedEventBus};

// Re-export config types
pub use crate::config::{AccessoryConfig, Config, ConfigBuilder, DiscoveryConfig};

// Re-export utility functions
pub use crate::utils::with_timeout;

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};
