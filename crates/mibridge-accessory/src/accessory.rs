/*!
 * Accessory composition.
 *
 * An [`Accessory`] ties one configured device to its services and
 * characteristic bindings. It owns the session manager for the device,
 * starts the event bridge whenever a session is discovered and routes host
 * reads and writes to the profile accessors.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, Instrument};

use mibridge_core::config::AccessoryConfig;
use mibridge_core::event::{EventReceiver, SharedEventBus};
use mibridge_core::logging::operation_span;
use mibridge_core::types::{Id, Value};
use mibridge_devices::{
    DeviceClient, DeviceKind, DeviceProfile, DeviceState, DiscoveryOptions, RetryPolicy,
    SessionManager,
};

use crate::bridge;
use crate::characteristic::{
    Access, Characteristic, CharacteristicId, CharacteristicUpdate, CharacteristicValues,
};
use crate::context::AccessoryContext;
use crate::error::{AccessoryError, Result};
use crate::profiles;
use crate::service::{services_for, Service};

/// A bridged device as the host sees it
pub struct Accessory {
    id: Id,
    name: String,
    profile: &'static DeviceProfile,
    address: String,
    ctx: Arc<AccessoryContext>,
    characteristics: HashMap<CharacteristicId, Characteristic>,
    services: Vec<Service>,
    events: SharedEventBus,
}

impl fmt::Debug for Accessory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessory")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.profile.kind)
            .field("address", &self.address)
            .field("state", &self.state())
            .finish()
    }
}

impl Accessory {
    /// Build an accessory from its configuration.
    ///
    /// Fails if the address or token is missing. Discovery does not start
    /// until [`start`](Self::start) is called.
    pub fn new(
        config: &AccessoryConfig,
        client: Arc<dyn DeviceClient>,
        policy: RetryPolicy,
        events: SharedEventBus,
    ) -> Result<Self> {
        config.validate()?;

        let name = config.display_name();
        let address = config.address.clone().unwrap_or_default();
        let token = config.token.clone().unwrap_or_default();
        let profile = DeviceProfile::for_kind(config.kind);
        let id = Id::for_name(&name);

        let mut options = DiscoveryOptions::new(address.clone(), token);
        if let Some(model) = config.model.as_deref().or(profile.expected_model) {
            options = options.with_model(model);
        }

        let sessions = SessionManager::new(client, options, policy);
        let values = CharacteristicValues::new(id.clone(), events.clone());
        let ctx = Arc::new(AccessoryContext::new(sessions, values));

        if profile.pushes_events {
            let weak = Arc::downgrade(&ctx);
            ctx.sessions().on_discovered(move |session| {
                if let Some(ctx) = weak.upgrade() {
                    let handle = bridge::spawn(ctx.clone(), session);
                    ctx.set_bridge(handle);
                }
            });
        }

        let mut characteristics: HashMap<CharacteristicId, Characteristic> = [
            Characteristic::fixed(CharacteristicId::Name, name.as_str()),
            Characteristic::fixed(CharacteristicId::Manufacturer, profile.manufacturer),
            Characteristic::fixed(CharacteristicId::Model, profile.model_name),
            Characteristic::fixed(CharacteristicId::SerialNumber, address.as_str()),
        ]
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
        for binding in profiles::bindings(config.kind, &ctx) {
            characteristics.insert(binding.id, binding);
        }

        debug!(
            "Built accessory {} ({}) at {} with {} characteristics",
            name,
            config.kind,
            address,
            characteristics.len()
        );

        Ok(Self {
            id,
            name,
            profile,
            address,
            ctx,
            characteristics,
            services: services_for(config.kind),
            events,
        })
    }

    /// Stable accessory id, derived from the name
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device class
    pub fn kind(&self) -> DeviceKind {
        self.profile.kind
    }

    /// Device address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connection status of the device session
    pub fn state(&self) -> DeviceState {
        self.ctx.sessions().state()
    }

    /// The session manager for this accessory's device
    pub fn sessions(&self) -> &SessionManager {
        self.ctx.sessions()
    }

    /// Start discovering the device in the background
    pub fn start(&self) {
        info!("Starting accessory {} ({})", self.name, self.profile.kind);
        self.ctx.sessions().start();
    }

    /// Services in presentation order
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Characteristic ids this accessory exposes
    pub fn characteristic_ids(&self) -> Vec<CharacteristicId> {
        self.services
            .iter()
            .flat_map(|service| service.characteristics.iter().copied())
            .collect()
    }

    fn binding(&self, id: CharacteristicId) -> Result<&Characteristic> {
        self.characteristics
            .get(&id)
            .ok_or(AccessoryError::UnknownCharacteristic(id))
    }

    /// Read a characteristic
    pub async fn get(&self, id: CharacteristicId) -> Result<Value> {
        let binding = self.binding(id)?;
        let span = operation_span(id.as_str(), &self.name);
        match &binding.access {
            Access::Static(value) => Ok(value.clone()),
            Access::Read(get) | Access::ReadWrite(get, _) => get().instrument(span).await,
        }
    }

    /// Write a characteristic
    pub async fn set(&self, id: CharacteristicId, value: Value) -> Result<()> {
        let binding = self.binding(id)?;
        let span = operation_span(id.as_str(), &self.name);
        match &binding.access {
            Access::ReadWrite(_, set) => set(value).instrument(span).await,
            Access::Static(_) | Access::Read(_) => Err(AccessoryError::ReadOnly(id)),
        }
    }

    /// Last value pushed to the host for `id`
    pub fn cached(&self, id: CharacteristicId) -> Option<Value> {
        self.ctx.values().get(id)
    }

    /// Handle the host's identify request
    pub fn identify(&self) {
        info!("Identify requested for {} at {}", self.name, self.address);
    }

    /// Subscribe to characteristic updates.
    ///
    /// The stream carries updates of every accessory on the same event bus;
    /// filter on [`CharacteristicUpdate::accessory`].
    pub fn subscribe(&self) -> Result<EventReceiver<CharacteristicUpdate>> {
        Ok(self.events.subscribe::<CharacteristicUpdate>()?)
    }

    /// Stop discovery and the event bridge and drop the session
    pub fn shutdown(&self) {
        debug!("Shutting down accessory {}", self.name);
        self.ctx.shutdown();
    }
}

impl Drop for Accessory {
    fn drop(&mut self) {
        self.ctx.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use mibridge_devices::devices::simulated::{SimulatedClient, SimulatedDevice};

    fn purifier(client: &SimulatedClient, address: &str) -> Accessory {
        let config = AccessoryConfig::new(DeviceKind::AirPurifier, address, "token");
        Accessory::new(
            &config,
            Arc::new(client.clone()),
            RetryPolicy::default(),
            SharedEventBus::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let mut config = AccessoryConfig::new(DeviceKind::Camera, "10.0.5.1", "t");
        config.token = None;

        let err = Accessory::new(
            &config,
            Arc::new(SimulatedClient::new()),
            RetryPolicy::default(),
            SharedEventBus::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing token"));
    }

    #[tokio::test]
    async fn test_identity_characteristics() {
        let accessory = purifier(&SimulatedClient::new(), "10.0.5.2");

        assert_eq!(accessory.name(), "Air Purifier");
        assert_eq!(accessory.id(), &Id::for_name("Air Purifier"));
        assert_eq!(
            accessory.get(CharacteristicId::Manufacturer).await.unwrap(),
            Value::from("Mi")
        );
        assert_eq!(
            accessory.get(CharacteristicId::Model).await.unwrap(),
            Value::from("Air Purifier 2")
        );
        assert_eq!(
            accessory.get(CharacteristicId::SerialNumber).await.unwrap(),
            Value::from("10.0.5.2")
        );
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let accessory = purifier(&SimulatedClient::new(), "10.0.5.3");

        assert!(matches!(
            accessory.get(CharacteristicId::On).await,
            Err(AccessoryError::UnknownCharacteristic(CharacteristicId::On))
        ));
        assert!(matches!(
            accessory.set(CharacteristicId::AirQuality, Value::Integer(1)).await,
            Err(AccessoryError::ReadOnly(CharacteristicId::AirQuality))
        ));
        assert!(matches!(
            accessory.set(CharacteristicId::Name, Value::from("x")).await,
            Err(AccessoryError::ReadOnly(CharacteristicId::Name))
        ));
    }

    #[tokio::test]
    async fn test_camera_characteristics() {
        let config = AccessoryConfig::new(DeviceKind::Camera, "10.0.5.4", "token")
            .with_name("Porch Camera");
        let accessory = Accessory::new(
            &config,
            Arc::new(SimulatedClient::new()),
            RetryPolicy::default(),
            SharedEventBus::new(),
        )
        .unwrap();

        assert_eq!(
            accessory.characteristic_ids(),
            vec![
                CharacteristicId::On,
                CharacteristicId::Name,
                CharacteristicId::Manufacturer,
                CharacteristicId::Model,
                CharacteristicId::SerialNumber,
            ]
        );
        assert_eq!(
            accessory.get(CharacteristicId::Name).await.unwrap(),
            Value::from("Porch Camera")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_discovery() {
        let client = SimulatedClient::new();
        client.refuse_connections(u32::MAX);
        client.add_device(SimulatedDevice::air_purifier("10.0.5.6"));
        let accessory = purifier(&client, "10.0.5.6");

        accessory.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(client.connect_attempts(), 1);

        drop(accessory);
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(client.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_camera_model_is_checked() {
        let client = SimulatedClient::new();
        client.add_device(SimulatedDevice::air_purifier("10.0.5.5"));
        let config = AccessoryConfig::new(DeviceKind::Camera, "10.0.5.5", "token");
        let accessory = Accessory::new(
            &config,
            Arc::new(client.clone()),
            RetryPolicy::default(),
            SharedEventBus::new(),
        )
        .unwrap();

        accessory.start();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(client.connect_attempts(), 1);
        assert!(accessory.sessions().session().is_err());
        accessory.shutdown();
    }
}
