/*!
 * Device client implementations for mibridge.
 *
 * The real miio transport lives outside this workspace; this module holds
 * the in-process simulation the bridge and its tests run against.
 */

pub mod simulated;

pub use simulated::{Command, SimulatedClient, SimulatedDevice};
