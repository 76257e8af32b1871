/*!
 * Last-known device state of one accessory.
 */
use crate::convert::Mode;

/// Device properties as last reported; `None` means not reported yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessoryState {
    /// Operating mode
    pub mode: Option<Mode>,
    /// PM2.5 density in µg/m³
    pub aqi: Option<u32>,
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity percent
    pub humidity: Option<u8>,
    /// Camera awake
    pub power_on: Option<bool>,
}
