/*!
 * Services group characteristics the way the host model presents them.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

use mibridge_devices::DeviceKind;

use crate::characteristic::CharacteristicId;

/// Service types used by the supported profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Name, manufacturer, model and serial number
    AccessoryInformation,
    /// Air purifier controls
    AirPurifier,
    /// Air quality readings
    AirQualitySensor,
    /// Temperature reading
    TemperatureSensor,
    /// Humidity reading
    HumiditySensor,
    /// On/off switch
    Switch,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A service and the characteristics it carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service type
    pub kind: ServiceKind,
    /// Characteristics, in presentation order
    pub characteristics: Vec<CharacteristicId>,
}

impl Service {
    fn new(kind: ServiceKind, characteristics: &[CharacteristicId]) -> Self {
        Self {
            kind,
            characteristics: characteristics.to_vec(),
        }
    }

    /// Whether this service carries `id`
    pub fn contains(&self, id: CharacteristicId) -> bool {
        self.characteristics.contains(&id)
    }
}

/// The services a device class is presented as
pub fn services_for(kind: DeviceKind) -> Vec<Service> {
    use CharacteristicId::*;

    let information = Service::new(
        ServiceKind::AccessoryInformation,
        &[Name, Manufacturer, Model, SerialNumber],
    );

    match kind {
        DeviceKind::AirPurifier => vec![
            Service::new(
                ServiceKind::AirPurifier,
                &[
                    Active,
                    CurrentAirPurifierState,
                    TargetAirPurifierState,
                    RotationSpeed,
                ],
            ),
            information,
            Service::new(ServiceKind::AirQualitySensor, &[AirQuality, Pm25Density]),
            Service::new(ServiceKind::TemperatureSensor, &[CurrentTemperature]),
            Service::new(ServiceKind::HumiditySensor, &[CurrentRelativeHumidity]),
        ],
        DeviceKind::Camera => vec![Service::new(ServiceKind::Switch, &[On]), information],
    }
}
