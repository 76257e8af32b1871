/*!
 * Logging functionality for mibridge.
 *
 * This module provides tracing setup and span helpers for consistent logging
 * across the bridge.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with_filter("info")
}

/// Initialize the logging system with a specific filter
///
/// `RUST_LOG` takes precedence over `filter` when set.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "mibridge_devices=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_logging(filter, false)
}

/// Initialize the logging system from the `[logging]` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_logging(&config.level, config.json_format)
}

fn init_logging(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let result = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .try_init()
    };

    result.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance, such as a device address
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

/// Create a new span for an operation
///
/// # Arguments
///
/// * `name` - The name of the operation
/// * `component` - The component performing the operation
pub fn operation_span(name: &str, component: &str) -> Span {
    tracing::debug_span!("operation", name = %name, component = %component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        // A second global subscriber in the same process is rejected; either outcome is fine here
        let _ = init();
    }

    #[test]
    fn test_spans_without_subscriber() {
        let no_subscriber = tracing::subscriber::NoSubscriber::default();
        tracing::subscriber::with_default(no_subscriber, || {
            let span = component_span("session", Some("192.168.1.20"));
            assert!(span.is_none());

            let span = operation_span("set", "RotationSpeed");
            assert!(span.is_none());
        });
    }
}
