/*!
 * Conversions between device-native state and characteristic values.
 *
 * Everything here is pure: the accessor layer and the event bridge call
 * these to turn a device mode, a PM2.5 reading or a favorite level into
 * the numeric codes the host model expects, and back.
 */
use std::fmt;

use mibridge_core::types::Value;
use mibridge_devices::profile::modes;

/// Device operating mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Fan stopped, device effectively off
    Idle,
    /// Device chooses the speed
    Auto,
    /// Speed follows the favorite level
    Favorite,
    /// Quiet fixed speed
    Silent,
    /// Any mode the bridge has no special handling for
    Other(String),
}

impl Mode {
    /// Parse the device's mode string
    pub fn parse(mode: &str) -> Self {
        match mode {
            modes::IDLE => Mode::Idle,
            modes::AUTO => Mode::Auto,
            modes::FAVORITE => Mode::Favorite,
            "silent" => Mode::Silent,
            other => Mode::Other(other.to_string()),
        }
    }

    /// The device's mode string
    pub fn as_str(&self) -> &str {
        match self {
            Mode::Idle => modes::IDLE,
            Mode::Auto => modes::AUTO,
            Mode::Favorite => modes::FAVORITE,
            Mode::Silent => "silent",
            Mode::Other(other) => other,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! hap_code {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident = $code:expr ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Numeric code used by the host
            pub fn code(self) -> u8 {
                match self {
                    $( $name::$variant => $code ),+
                }
            }

            /// Look up a value by numeric code
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $( c if c == $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for Value {
            fn from(value: $name) -> Self {
                Value::Integer(i64::from(value.code()))
            }
        }
    };
}

hap_code! {
    /// Active characteristic
    Active {
        /// Off
        Inactive = 0,
        /// On
        Active = 1,
    }
}

hap_code! {
    /// CurrentAirPurifierState characteristic
    CurrentAirPurifierState {
        /// Not running
        Inactive = 0,
        /// Running but not moving air
        Idle = 1,
        /// Moving air
        PurifyingAir = 2,
    }
}

hap_code! {
    /// TargetAirPurifierState characteristic
    TargetAirPurifierState {
        /// User-chosen speed
        Manual = 0,
        /// Device-chosen speed
        Auto = 1,
    }
}

hap_code! {
    /// AirQuality characteristic
    AirQuality {
        /// No reading yet
        Unknown = 0,
        /// PM2.5 below 50
        Excellent = 1,
        /// PM2.5 from 50
        Good = 2,
        /// PM2.5 from 100
        Fair = 3,
        /// PM2.5 from 150
        Inferior = 4,
        /// PM2.5 from 200
        Poor = 5,
    }
}

/// Lower bounds of the air quality bands, highest first
const AIR_QUALITY_BANDS: [(u32, AirQuality); 5] = [
    (200, AirQuality::Poor),
    (150, AirQuality::Inferior),
    (100, AirQuality::Fair),
    (50, AirQuality::Good),
    (0, AirQuality::Excellent),
];

/// Favorite levels run 0..=16; one level is 6.25 percent of rotation speed
const PERCENT_PER_LEVEL: f64 = 6.25;

/// Highest favorite level
pub const MAX_LEVEL: u8 = 16;

/// Active is on for every mode except idle
pub fn active_for(mode: &Mode) -> Active {
    match mode {
        Mode::Idle => Active::Inactive,
        _ => Active::Active,
    }
}

/// The purifier reports no intermediate idle state
pub fn current_state_for(mode: &Mode) -> CurrentAirPurifierState {
    match mode {
        Mode::Idle => CurrentAirPurifierState::Inactive,
        _ => CurrentAirPurifierState::PurifyingAir,
    }
}

/// Manual iff the device is in favorite mode
pub fn target_state_for(mode: &Mode) -> TargetAirPurifierState {
    match mode {
        Mode::Favorite => TargetAirPurifierState::Manual,
        _ => TargetAirPurifierState::Auto,
    }
}

/// Mode to request for a target state
pub fn mode_for_target(target: TargetAirPurifierState) -> Mode {
    match target {
        TargetAirPurifierState::Auto => Mode::Auto,
        TargetAirPurifierState::Manual => Mode::Favorite,
    }
}

/// Air quality band of a PM2.5 reading
pub fn air_quality_band(aqi: u32) -> AirQuality {
    AIR_QUALITY_BANDS
        .iter()
        .find(|(lower, _)| aqi >= *lower)
        .map(|(_, band)| *band)
        .unwrap_or(AirQuality::Excellent)
}

/// Air quality of an optional reading; unknown while unset
pub fn air_quality_for(aqi: Option<u32>) -> AirQuality {
    aqi.map(air_quality_band).unwrap_or(AirQuality::Unknown)
}

/// Rotation speed percent for a favorite level
pub fn to_speed(level: u8) -> u8 {
    (f64::from(level.min(MAX_LEVEL)) * PERCENT_PER_LEVEL).ceil() as u8
}

/// Favorite level for a rotation speed percent, or `None` above 100.
///
/// Any non-zero speed maps to at least level 1.
pub fn to_level(speed: u8) -> Option<u8> {
    if speed > 100 {
        return None;
    }
    let level = (f64::from(speed) / PERCENT_PER_LEVEL).round() as u8;
    let level = if speed > 0 { level.max(1) } else { level };
    Some(level.min(MAX_LEVEL))
}

/// Strip a trailing unit such as `"°C"` or `" %"` and parse the number
fn parse_numeric_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let end = trimmed
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().ok()
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        Value::String(s) => parse_numeric_str(s),
        _ => None,
    }
}

/// Temperature in °C from a number or a numeric string with optional unit
pub fn parse_temperature(value: &Value) -> Option<f64> {
    parse_number(value)
}

/// PM2.5 density from a non-negative number
pub fn parse_aqi(value: &Value) -> Option<u32> {
    parse_number(value)
        .filter(|v| *v >= 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v.round() as u32)
}

/// Relative humidity percent
pub fn parse_humidity(value: &Value) -> Option<u8> {
    parse_number(value)
        .filter(|v| (0.0..=100.0).contains(v))
        .map(|v| v.round() as u8)
}

/// Mode from a pushed or snapshot value
pub fn parse_mode(value: &Value) -> Option<Mode> {
    value.as_str().map(Mode::parse)
}

/// Interpret a camera status payload: the first item that says the camera is
/// asleep or awake decides.
pub fn camera_power(status: &Value) -> Option<bool> {
    let items = status.as_array()?;
    for item in items {
        let Some(fields) = item.as_object() else {
            continue;
        };
        let field = |key: &str| fields.get(key).and_then(Value::as_str);
        if field("sysstatus") == Some("sleep") {
            return Some(false);
        }
        if field("wakeuplevel") == Some("2") {
            return Some(true);
        }
    }
    None
}
