/*!
 * Device error, state and event types.
 *
 * These are the vocabulary shared by the session manager, the device client
 * traits and everything that consumes a live device session.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mibridge_core::{error::Error as CoreError, types::Value};

/// Error type for device operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// No session has been established with the device
    #[error("Device not connected")]
    NotConnected,

    /// The session existed but the device stopped answering
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The device answered but refused the command
    #[error("Command {method} rejected: {message}")]
    CommandRejected {
        /// The method that was invoked
        method: String,
        /// The device-reported reason
        message: String,
    },

    /// The device answered with a payload we cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The device reported a model other than the one requested
    #[error("Unexpected model: expected {expected}, found {actual}")]
    UnexpectedModel {
        /// Model given in the discovery options
        expected: String,
        /// Model the device reported
        actual: String,
    },

    /// Communication error with the device
    #[error("Communication error: {0}")]
    CommunicationError(String),

    /// Timeout error
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl DeviceError {
    /// Build a rejection for `method`
    pub fn rejected<M: Into<String>, S: Into<String>>(method: M, message: S) -> Self {
        DeviceError::CommandRejected {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the session is no longer usable
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, DeviceError::ConnectionLost(_))
    }
}

impl From<CoreError> for DeviceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Timeout(msg) => DeviceError::Timeout(msg),
            other => DeviceError::Other(other.to_string()),
        }
    }
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Connection status of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceState {
    /// No session, and no attempt in flight
    #[default]
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// A session is established
    Connected,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}

/// Event pushed by a device without being asked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceEvent {
    /// A property value has changed on the device
    PropertyChanged {
        /// The change event name (see [`crate::profile::events`])
        property: String,
        /// The new value
        value: Value,
    },
}

impl DeviceEvent {
    /// Create a property change event
    pub fn property_changed<P: Into<String>, V: Into<Value>>(property: P, value: V) -> Self {
        DeviceEvent::PropertyChanged {
            property: property.into(),
            value: value.into(),
        }
    }
}
