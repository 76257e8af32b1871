/*!
 * Characteristic bindings.
 *
 * A characteristic is an id plus an access variant: a static value, a read
 * handler, or a read handler and a write handler. Handlers are boxed async
 * closures so each profile can bind its own accessors. The last value pushed
 * for each characteristic is cached in [`CharacteristicValues`], which also
 * publishes every push on the event bus as a [`CharacteristicUpdate`].
 */
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use mibridge_core::event::SharedEventBus;
use mibridge_core::types::{Id, Value};

use crate::error::Result;

/// Characteristic identifiers, named as in the host model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacteristicId {
    /// Accessory name
    Name,
    /// Manufacturer
    Manufacturer,
    /// Model name
    Model,
    /// Serial number
    SerialNumber,
    /// Air purifier power
    Active,
    /// What the purifier is doing
    CurrentAirPurifierState,
    /// Manual or automatic speed
    TargetAirPurifierState,
    /// Fan speed percent
    RotationSpeed,
    /// Air quality band
    AirQuality,
    /// PM2.5 density
    #[serde(rename = "PM2_5Density")]
    Pm25Density,
    /// Temperature in °C
    CurrentTemperature,
    /// Relative humidity percent
    CurrentRelativeHumidity,
    /// Camera switch
    On,
}

impl CharacteristicId {
    /// Name used by the host model
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacteristicId::Name => "Name",
            CharacteristicId::Manufacturer => "Manufacturer",
            CharacteristicId::Model => "Model",
            CharacteristicId::SerialNumber => "SerialNumber",
            CharacteristicId::Active => "Active",
            CharacteristicId::CurrentAirPurifierState => "CurrentAirPurifierState",
            CharacteristicId::TargetAirPurifierState => "TargetAirPurifierState",
            CharacteristicId::RotationSpeed => "RotationSpeed",
            CharacteristicId::AirQuality => "AirQuality",
            CharacteristicId::Pm25Density => "PM2_5Density",
            CharacteristicId::CurrentTemperature => "CurrentTemperature",
            CharacteristicId::CurrentRelativeHumidity => "CurrentRelativeHumidity",
            CharacteristicId::On => "On",
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boxed read handler
pub type GetHandler = Box<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Boxed write handler
pub type SetHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// How a characteristic can be accessed
pub enum Access {
    /// Fixed value, never touches the device
    Static(Value),
    /// Readable
    Read(GetHandler),
    /// Readable and writable
    ReadWrite(GetHandler, SetHandler),
}

impl Access {
    /// A read-only characteristic backed by `get`
    pub fn read<G, GF>(get: G) -> Self
    where
        G: Fn() -> GF + Send + Sync + 'static,
        GF: Future<Output = Result<Value>> + Send + 'static,
    {
        Access::Read(Box::new(move || get().boxed()))
    }

    /// A writable characteristic backed by `get` and `set`
    pub fn read_write<G, GF, S, SF>(get: G, set: S) -> Self
    where
        G: Fn() -> GF + Send + Sync + 'static,
        GF: Future<Output = Result<Value>> + Send + 'static,
        S: Fn(Value) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<()>> + Send + 'static,
    {
        Access::ReadWrite(
            Box::new(move || get().boxed()),
            Box::new(move |value| set(value).boxed()),
        )
    }

    /// Whether the host may write this characteristic
    pub fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite(..))
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Access::Read(_) => f.write_str("Read"),
            Access::ReadWrite(..) => f.write_str("ReadWrite"),
        }
    }
}

/// A characteristic and how to reach it
#[derive(Debug)]
pub struct Characteristic {
    /// The characteristic id
    pub id: CharacteristicId,
    /// How it is accessed
    pub access: Access,
}

impl Characteristic {
    /// Create a binding
    pub fn new(id: CharacteristicId, access: Access) -> Self {
        Self { id, access }
    }

    /// A static binding
    pub fn fixed<V: Into<Value>>(id: CharacteristicId, value: V) -> Self {
        Self::new(id, Access::Static(value.into()))
    }
}

/// A value pushed to the host without being asked for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicUpdate {
    /// Accessory the characteristic belongs to
    pub accessory: Id,
    /// The characteristic
    pub characteristic: CharacteristicId,
    /// The new value
    pub value: Value,
    /// When the value was pushed
    pub timestamp: DateTime<Utc>,
}

/// Last pushed value of each characteristic of one accessory
#[derive(Debug)]
pub struct CharacteristicValues {
    accessory: Id,
    values: RwLock<HashMap<CharacteristicId, Value>>,
    events: SharedEventBus,
}

impl CharacteristicValues {
    /// Create an empty cache publishing on `events`
    pub fn new(accessory: Id, events: SharedEventBus) -> Self {
        Self {
            accessory,
            values: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Last value pushed for `id`
    pub fn get(&self, id: CharacteristicId) -> Option<Value> {
        self.values.read().ok().and_then(|values| values.get(&id).cloned())
    }

    /// Store a new value and send it to the host
    pub fn update<V: Into<Value>>(&self, id: CharacteristicId, value: V) {
        let value = value.into();
        trace!("update {} = {}", id, value);

        if let Ok(mut values) = self.values.write() {
            values.insert(id, value.clone());
        }

        let update = CharacteristicUpdate {
            accessory: self.accessory.clone(),
            characteristic: id,
            value,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.events.publish(update) {
            warn!("Failed to publish update for {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessoryError;

    #[tokio::test]
    async fn test_access_handlers_are_callable() {
        let access = Access::read_write(
            || async { Ok(Value::Integer(1)) },
            |value: Value| async move {
                match value {
                    Value::Integer(_) => Ok(()),
                    _ => Err(AccessoryError::invalid(CharacteristicId::Active, "not a number")),
                }
            },
        );
        assert!(access.is_writable());

        let Access::ReadWrite(get, set) = access else {
            panic!("expected read/write access");
        };
        assert_eq!(get().await.unwrap(), Value::Integer(1));
        assert!(set(Value::Integer(0)).await.is_ok());
        assert!(set(Value::Bool(true)).await.is_err());
    }

    #[tokio::test]
    async fn test_update_caches_and_publishes() {
        let events = SharedEventBus::new();
        let mut rx = events.subscribe::<CharacteristicUpdate>().unwrap();
        let values = CharacteristicValues::new(Id::from("purifier"), events);

        values.update(CharacteristicId::Pm25Density, 120u32);

        assert_eq!(values.get(CharacteristicId::Pm25Density), Some(Value::Integer(120)));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.accessory, Id::from("purifier"));
        assert_eq!(update.characteristic, CharacteristicId::Pm25Density);
        assert_eq!(update.value, Value::Integer(120));
    }

    #[test]
    fn test_host_names() {
        assert_eq!(CharacteristicId::Pm25Density.to_string(), "PM2_5Density");
        assert_eq!(CharacteristicId::On.as_str(), "On");
        assert!(!Access::Static(Value::from("Mi")).is_writable());
    }
}
