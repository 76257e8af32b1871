/*!
 * Device profiles.
 *
 * Names the device-native properties, push events and methods of each
 * supported device class, together with the identity the bridge reports
 * for it.
 */
pub use mibridge_core::types::DeviceKind;

/// Property names as reported in a session's property snapshot
pub mod properties {
    /// Power switch, `"on"`/`"off"` or boolean
    pub const POWER: &str = "power";
    /// Operating mode: `idle`, `auto`, `silent`, `favorite`, ...
    pub const MODE: &str = "mode";
    /// PM2.5 density in µg/m³
    pub const AQI: &str = "aqi";
    /// Temperature in °C
    pub const TEMPERATURE: &str = "temperature";
    /// Relative humidity in percent
    pub const HUMIDITY: &str = "humidity";
    /// Indicator light
    pub const LED: &str = "led";
    /// Favorite-mode fan level, 0..=16
    pub const FAVORITE_LEVEL: &str = "favorite_level";
}

/// Names of pushed change events
pub mod events {
    /// Mode changed
    pub const MODE: &str = "mode";
    /// PM2.5 density changed
    pub const PM2_5: &str = "pm2.5";
    /// Temperature changed
    pub const TEMPERATURE: &str = "temperature";
    /// Relative humidity changed
    pub const RELATIVE_HUMIDITY: &str = "relativeHumidity";
}

/// Device-native operating modes the bridge cares about
pub mod modes {
    /// Fan stopped
    pub const IDLE: &str = "idle";
    /// Device-controlled speed
    pub const AUTO: &str = "auto";
    /// User-chosen speed, set through the favorite level
    pub const FAVORITE: &str = "favorite";
}

/// Generic methods used through `DeviceSession::call`
pub mod methods {
    /// Camera bulk status query
    pub const GET_DEVICE_STATUS: &str = "get_devicestatus";
    /// Camera sleep/wake command
    pub const SET_SYSTEM_STATUS: &str = "set_sysstatus";
}

/// Static description of a device class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// The device class
    pub kind: DeviceKind,
    /// Manufacturer reported to the host
    pub manufacturer: &'static str,
    /// Model name reported to the host
    pub model_name: &'static str,
    /// Device model string that must match during discovery, if any
    pub expected_model: Option<&'static str>,
    /// Whether the device pushes property changes
    pub pushes_events: bool,
}

/// Mi Air Purifier 2
pub const AIR_PURIFIER: DeviceProfile = DeviceProfile {
    kind: DeviceKind::AirPurifier,
    manufacturer: "Mi",
    model_name: "Air Purifier 2",
    expected_model: None,
    pushes_events: true,
};

/// Mi camera (xiaobai)
pub const CAMERA: DeviceProfile = DeviceProfile {
    kind: DeviceKind::Camera,
    manufacturer: "Mi",
    model_name: "Mi Camera",
    expected_model: Some("chuangmi.camera.xiaobai"),
    pushes_events: false,
};

impl DeviceProfile {
    /// Look up the profile for a device class
    pub fn for_kind(kind: DeviceKind) -> &'static DeviceProfile {
        match kind {
            DeviceKind::AirPurifier => &AIR_PURIFIER,
            DeviceKind::Camera => &CAMERA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup() {
        let profile = DeviceProfile::for_kind(DeviceKind::Camera);
        assert_eq!(profile.expected_model, Some("chuangmi.camera.xiaobai"));
        assert!(!profile.pushes_events);

        let profile = DeviceProfile::for_kind(DeviceKind::AirPurifier);
        assert_eq!(profile.model_name, "Air Purifier 2");
        assert!(profile.pushes_events);
    }
}
