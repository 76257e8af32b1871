/*!
 * Error types for accessory operations.
 */
use thiserror::Error;

use mibridge_core::error::Error as CoreError;
use mibridge_devices::DeviceError;

use crate::characteristic::CharacteristicId;

/// Error type for accessory operations
#[derive(Error, Debug)]
pub enum AccessoryError {
    /// No device session exists yet; no device call was made
    #[error("Device not discovered yet")]
    NotDiscovered,

    /// The device rejected or failed a command
    #[error("Device command failed: {0}")]
    Command(#[from] DeviceError),

    /// A write was attempted on a read-only characteristic
    #[error("Characteristic {0} is read-only")]
    ReadOnly(CharacteristicId),

    /// A write carried a value of the wrong type or out of range
    #[error("Invalid value for {characteristic}: {message}")]
    InvalidValue {
        /// The characteristic written
        characteristic: CharacteristicId,
        /// What was wrong with the value
        message: String,
    },

    /// The state the characteristic is derived from has not been reported yet
    #[error("Value of {0} is not known yet")]
    ValueUnknown(CharacteristicId),

    /// The accessory has no such characteristic
    #[error("Unknown characteristic {0}")]
    UnknownCharacteristic(CharacteristicId),

    /// The camera status payload matched no known pattern
    #[error("Unrecognized device status: {0}")]
    UnrecognizedStatus(String),

    /// Accessory registry error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Core error (configuration, event bus)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AccessoryError {
    /// Build an invalid-value error
    pub fn invalid<S: Into<String>>(characteristic: CharacteristicId, message: S) -> Self {
        AccessoryError::InvalidValue {
            characteristic,
            message: message.into(),
        }
    }

    /// Whether the accessory simply has not found its device yet
    pub fn is_not_discovered(&self) -> bool {
        matches!(self, AccessoryError::NotDiscovered)
    }
}

/// Result type for accessory operations
pub type Result<T> = std::result::Result<T, AccessoryError>;
