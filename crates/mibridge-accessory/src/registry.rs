/*!
 * Accessory registry for mibridge.
 *
 * Holds every accessory the bridge exposes, keyed by id, and announces
 * additions and removals on the event bus.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mibridge_core::config::Config;
use mibridge_core::event::SharedEventBus;
use mibridge_core::types::Id;
use mibridge_devices::{DeviceClient, DeviceKind, RetryPolicy};

use crate::accessory::Accessory;
use crate::error::{AccessoryError, Result};

/// Event types for the accessory registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// An accessory was added to the registry
    Added {
        /// The accessory id
        id: Id,
        /// The accessory name
        name: String,
        /// The device class
        kind: DeviceKind,
    },
    /// An accessory was removed from the registry
    Removed(Id),
}

/// Accessory registry
#[derive(Debug)]
pub struct AccessoryRegistry {
    accessories: RwLock<HashMap<Id, Arc<Accessory>>>,
    events: SharedEventBus,
}

impl AccessoryRegistry {
    /// Create an empty registry publishing on `events`
    pub fn new(events: SharedEventBus) -> Self {
        Self {
            accessories: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Build and register one accessory per configured entry
    pub fn from_config(
        config: &Config,
        client: Arc<dyn DeviceClient>,
        events: SharedEventBus,
    ) -> Result<Self> {
        let registry = Self::new(events.clone());
        let policy = RetryPolicy::from(&config.discovery);
        for entry in &config.accessories {
            let accessory = Accessory::new(entry, client.clone(), policy.clone(), events.clone())?;
            registry.register(accessory)?;
        }
        Ok(registry)
    }

    fn lock_error() -> AccessoryError {
        AccessoryError::Registry("Failed to acquire lock on accessory registry".to_string())
    }

    /// Register an accessory; names must be unique
    pub fn register(&self, accessory: Accessory) -> Result<Arc<Accessory>> {
        let id = accessory.id().clone();
        let mut accessories = self.accessories.write().map_err(|_| Self::lock_error())?;

        if accessories.contains_key(&id) {
            return Err(AccessoryError::Registry(format!(
                "Accessory {} ({}) already registered",
                accessory.name(),
                id
            )));
        }

        let event = RegistryEvent::Added {
            id: id.clone(),
            name: accessory.name().to_string(),
            kind: accessory.kind(),
        };
        let accessory = Arc::new(accessory);
        accessories.insert(id.clone(), accessory.clone());
        drop(accessories);

        if let Err(e) = self.events.publish(event) {
            warn!("Failed to announce accessory {}: {}", id, e);
        }
        debug!("Registered accessory {} with ID {}", accessory.name(), id);

        Ok(accessory)
    }

    /// Remove an accessory and shut it down
    pub fn unregister(&self, id: &Id) -> Result<()> {
        let removed = self
            .accessories
            .write()
            .map_err(|_| Self::lock_error())?
            .remove(id)
            .ok_or_else(|| AccessoryError::Registry(format!("Accessory {} not registered", id)))?;

        removed.shutdown();
        if let Err(e) = self.events.publish(RegistryEvent::Removed(id.clone())) {
            warn!("Failed to announce removal of {}: {}", id, e);
        }
        debug!("Unregistered accessory with ID {}", id);

        Ok(())
    }

    /// Get an accessory by id
    pub fn get(&self, id: &Id) -> Result<Arc<Accessory>> {
        self.accessories
            .read()
            .map_err(|_| Self::lock_error())?
            .get(id)
            .cloned()
            .ok_or_else(|| AccessoryError::Registry(format!("Accessory {} not found", id)))
    }

    /// Get an accessory by display name
    pub fn get_by_name(&self, name: &str) -> Result<Arc<Accessory>> {
        self.get(&Id::for_name(name))
    }

    /// All registered accessories, ordered by name
    pub fn accessories(&self) -> Result<Vec<Arc<Accessory>>> {
        let accessories = self.accessories.read().map_err(|_| Self::lock_error())?;
        let mut all: Vec<_> = accessories.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    /// Number of registered accessories
    pub fn count(&self) -> Result<usize> {
        Ok(self.accessories.read().map_err(|_| Self::lock_error())?.len())
    }

    /// Whether an accessory is registered
    pub fn contains(&self, id: &Id) -> Result<bool> {
        Ok(self
            .accessories
            .read()
            .map_err(|_| Self::lock_error())?
            .contains_key(id))
    }

    /// Start discovery for every accessory
    pub fn start_all(&self) -> Result<()> {
        let accessories = self.accessories()?;
        for accessory in &accessories {
            accessory.start();
        }
        info!("Started {} accessories", accessories.len());
        Ok(())
    }

    /// Shut down every accessory
    pub fn shutdown_all(&self) -> Result<()> {
        let accessories = self.accessories()?;
        for accessory in &accessories {
            accessory.shutdown();
        }
        info!("Shut down {} accessories", accessories.len());
        Ok(())
    }
}
