/*!
 * Characteristic accessors per device profile.
 */
use std::sync::Arc;

use mibridge_devices::DeviceKind;

use crate::characteristic::Characteristic;
use crate::context::AccessoryContext;

pub mod air_purifier;
pub mod camera;

/// Device-backed characteristic bindings for a device class
pub fn bindings(kind: DeviceKind, ctx: &Arc<AccessoryContext>) -> Vec<Characteristic> {
    match kind {
        DeviceKind::AirPurifier => air_purifier::bindings(ctx),
        DeviceKind::Camera => camera::bindings(ctx),
    }
}
