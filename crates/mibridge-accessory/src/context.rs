/*!
 * Shared context of one accessory.
 *
 * Everything the accessors and the event bridge need: the session manager,
 * the last-known device state and the characteristic value cache.
 */
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use mibridge_devices::{DeviceError, DeviceSession, SessionManager};

use crate::characteristic::{CharacteristicId, CharacteristicValues};
use crate::convert::{self, Mode};
use crate::error::{AccessoryError, Result};
use crate::state::AccessoryState;

/// Shared context of one accessory
#[derive(Debug)]
pub struct AccessoryContext {
    sessions: SessionManager,
    state: Mutex<AccessoryState>,
    values: CharacteristicValues,
    bridge: StdMutex<Option<JoinHandle<()>>>,
}

impl AccessoryContext {
    /// Create a context with empty state
    pub fn new(sessions: SessionManager, values: CharacteristicValues) -> Self {
        Self {
            sessions,
            state: Mutex::new(AccessoryState::default()),
            values,
            bridge: StdMutex::new(None),
        }
    }

    /// The session manager
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The live session, or [`AccessoryError::NotDiscovered`]
    pub fn session(&self) -> Result<Arc<dyn DeviceSession>> {
        self.sessions
            .session()
            .map_err(|_| AccessoryError::NotDiscovered)
    }

    /// Lock the accessory state
    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, AccessoryState> {
        self.state.lock().await
    }

    /// The characteristic value cache
    pub fn values(&self) -> &CharacteristicValues {
        &self.values
    }

    /// Turn a failed device command into an accessory error, letting the
    /// session manager see it first
    pub fn command_failed(&self, err: DeviceError) -> AccessoryError {
        self.sessions.report_failure(&err);
        AccessoryError::Command(err)
    }

    /// Push the three characteristics derived from the mode.
    ///
    /// Takes the locked state so callers hold the lock across all three.
    pub fn push_mode(&self, state: &AccessoryState) {
        if let Some(mode) = state.mode.as_ref() {
            self.push_mode_derived(mode);
        }
    }

    fn push_mode_derived(&self, mode: &Mode) {
        self.values
            .update(CharacteristicId::Active, convert::active_for(mode));
        self.values.update(
            CharacteristicId::CurrentAirPurifierState,
            convert::current_state_for(mode),
        );
        self.values.update(
            CharacteristicId::TargetAirPurifierState,
            convert::target_state_for(mode),
        );
    }

    /// Push AirQuality and PM2_5Density for the current reading
    pub fn push_air_quality(&self, state: &AccessoryState) {
        self.values.update(
            CharacteristicId::AirQuality,
            convert::air_quality_for(state.aqi),
        );
        if let Some(aqi) = state.aqi {
            self.values.update(CharacteristicId::Pm25Density, aqi);
        }
    }

    /// Remember the running bridge task, stopping any previous one
    pub fn set_bridge(&self, handle: JoinHandle<()>) {
        if let Ok(mut bridge) = self.bridge.lock() {
            if let Some(previous) = bridge.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the bridge task and the session
    pub fn shutdown(&self) {
        if let Ok(mut bridge) = self.bridge.lock() {
            if let Some(handle) = bridge.take() {
                handle.abort();
            }
        }
        self.sessions.shutdown();
    }
}
