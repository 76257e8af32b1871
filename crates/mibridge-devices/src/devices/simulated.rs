/*!
 * Simulated device client.
 *
 * An in-process stand-in for the device network used by the tests and by
 * `mibridge run`. Each simulated device keeps a property table, answers the
 * commands a real device answers, records every command it receives and
 * can be scripted to fail.
 */

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use mibridge_core::types::{DeviceKind, Value};

use crate::device::{DeviceError, DeviceEvent, Result};
use crate::discovery::DiscoveryOptions;
use crate::profile::{events, methods, modes, properties};
use crate::protocol::{DeviceClient, DeviceSession};

/// Model string reported by the simulated air purifier
pub const AIR_PURIFIER_MODEL: &str = "zhimi.airpurifier.m2";
/// Model string reported by the simulated camera
pub const CAMERA_MODEL: &str = "chuangmi.camera.xiaobai";

const MAX_FAVORITE_LEVEL: u8 = 16;

/// A command received by a simulated device
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `set_power`
    SetPower(bool),
    /// `set_mode`
    SetMode(String),
    /// `favorite_level`
    FavoriteLevel,
    /// `set_favorite_level`
    SetFavoriteLevel(u8),
    /// A generic method call
    Call {
        /// Method name
        method: String,
        /// Positional arguments
        args: Vec<Value>,
    },
}

struct Inner {
    kind: DeviceKind,
    address: String,
    model: String,
    connect_delay: RwLock<Duration>,
    properties: RwLock<HashMap<String, Value>>,
    restore_mode: RwLock<String>,
    sleeping: RwLock<bool>,
    responses: RwLock<HashMap<String, Value>>,
    commands: RwLock<Vec<Command>>,
    failures: RwLock<VecDeque<DeviceError>>,
    event_tx: broadcast::Sender<DeviceEvent>,
}

/// Handle to one simulated device; clones share the same device
#[derive(Clone)]
pub struct SimulatedDevice {
    inner: Arc<Inner>,
}

impl fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("kind", &self.inner.kind)
            .field("address", &self.inner.address)
            .field("model", &self.inner.model)
            .finish()
    }
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Property that a pushed event name updates
fn property_for_event(event: &str) -> &str {
    match event {
        events::PM2_5 => properties::AQI,
        events::RELATIVE_HUMIDITY => properties::HUMIDITY,
        other => other,
    }
}

impl SimulatedDevice {
    fn new(kind: DeviceKind, address: &str, model: &str, props: HashMap<String, Value>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(Inner {
                kind,
                address: address.to_string(),
                model: model.to_string(),
                connect_delay: RwLock::new(Duration::ZERO),
                properties: RwLock::new(props),
                restore_mode: RwLock::new(modes::AUTO.to_string()),
                sleeping: RwLock::new(false),
                responses: RwLock::new(HashMap::new()),
                commands: RwLock::new(Vec::new()),
                failures: RwLock::new(VecDeque::new()),
                event_tx,
            }),
        }
    }

    /// An air purifier in auto mode with clean air
    pub fn air_purifier(address: &str) -> Self {
        let props = HashMap::from([
            (properties::POWER.to_string(), Value::from("on")),
            (properties::MODE.to_string(), Value::from(modes::AUTO)),
            (properties::AQI.to_string(), Value::from(12)),
            (properties::TEMPERATURE.to_string(), Value::from(22.5)),
            (properties::HUMIDITY.to_string(), Value::from(45)),
            (properties::LED.to_string(), Value::from("on")),
            (properties::FAVORITE_LEVEL.to_string(), Value::from(8u8)),
        ]);
        Self::new(DeviceKind::AirPurifier, address, AIR_PURIFIER_MODEL, props)
    }

    /// An awake camera
    pub fn camera(address: &str) -> Self {
        Self::new(DeviceKind::Camera, address, CAMERA_MODEL, HashMap::new())
    }

    /// The device class
    pub fn kind(&self) -> DeviceKind {
        self.inner.kind
    }

    /// Network address
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Delay every connect attempt by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        write(&self.inner.connect_delay, delay);
    }

    /// Overwrite a property without pushing an event
    pub fn set_property<V: Into<Value>>(&self, name: &str, value: V) {
        self.inner
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.into());
    }

    /// Put the camera to sleep or wake it, without going through a command
    pub fn set_sleeping(&self, sleeping: bool) {
        write(&self.inner.sleeping, sleeping);
    }

    /// Answer every later call to `method` with `response`
    pub fn set_response<V: Into<Value>>(&self, method: &str, response: V) {
        self.inner
            .responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_string(), response.into());
    }

    /// Fail the next command with `err`; queued failures are used in order
    pub fn fail_next(&self, err: DeviceError) {
        self.inner
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Every command received so far, oldest first
    pub fn commands(&self) -> Vec<Command> {
        read(&self.inner.commands)
    }

    /// Simulate the device pushing a change event
    pub fn push<V: Into<Value>>(&self, event: &str, value: V) {
        let value = value.into();
        self.set_property(property_for_event(event), value.clone());
        trace!("simulated {}: push {}={}", self.inner.address, event, value);
        // No subscribers is fine; nobody is listening yet
        let _ = self
            .inner
            .event_tx
            .send(DeviceEvent::property_changed(event, value));
    }

    /// Slowly vary the air readings and push them, like a room would
    pub fn spawn_ambient_drift(&self, period: Duration) -> JoinHandle<()> {
        let device = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut tick: i64 = 0;
            loop {
                interval.tick().await;
                tick += 1;

                // Triangle wave so PM2.5 crosses every air quality band
                let phase = tick % 60;
                let aqi = if phase < 30 { 10 + phase * 8 } else { 10 + (60 - phase) * 8 };
                device.push(events::PM2_5, aqi);

                if tick % 3 == 0 {
                    let temperature = 21.0 + ((tick / 3) % 5) as f64 * 0.5;
                    device.push(events::TEMPERATURE, temperature);
                }
                if tick % 5 == 0 {
                    let humidity = 40 + (tick / 5) % 10;
                    device.push(events::RELATIVE_HUMIDITY, humidity);
                }
            }
        })
    }

    fn record(&self, command: Command) -> Result<()> {
        debug!("simulated {}: {:?}", self.inner.address, command);
        self.inner
            .commands
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);

        match self
            .inner
            .failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_purifier(&self, method: &str) -> Result<()> {
        match self.inner.kind {
            DeviceKind::AirPurifier => Ok(()),
            DeviceKind::Camera => Err(DeviceError::rejected(method, "unsupported")),
        }
    }

    fn current_mode(&self) -> Option<String> {
        self.property(properties::MODE)
            .and_then(|mode| mode.as_str().map(str::to_string))
    }

    fn camera_status(&self) -> Value {
        let entry = |key: &str, value: &str| Value::object([(key, value)]);
        let mut status = Vec::new();
        if read(&self.inner.sleeping) {
            status.push(entry("sysstatus", "sleep"));
        }
        status.extend([
            entry("alarmsensitivity", "1"),
            entry("infraredlight", "0"),
            entry("cameraprompt", "on"),
            entry("ledstatus", "on"),
            entry("wakeuplevel", "2"),
            entry("recordtype", "2"),
        ]);
        Value::Array(status)
    }

    fn set_system_status(&self, args: &[Value]) -> Result<Value> {
        let cmd = args
            .first()
            .and_then(Value::as_object)
            .and_then(|arg| arg.get("cmd"))
            .and_then(Value::as_str)
            .ok_or_else(|| DeviceError::rejected(methods::SET_SYSTEM_STATUS, "missing cmd"))?;

        match cmd {
            "normal" => write(&self.inner.sleeping, false),
            "sleep" => write(&self.inner.sleeping, true),
            other => {
                return Err(DeviceError::rejected(
                    methods::SET_SYSTEM_STATUS,
                    format!("unknown cmd {}", other),
                ))
            }
        }
        Ok(Value::Array(vec![Value::from("ok")]))
    }
}

#[async_trait]
impl DeviceSession for SimulatedDevice {
    fn model(&self) -> &str {
        &self.inner.model
    }

    fn address(&self) -> &str {
        &self.inner.address
    }

    fn property(&self, name: &str) -> Option<Value> {
        self.inner
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn properties(&self) -> HashMap<String, Value> {
        read(&self.inner.properties)
    }

    async fn set_power(&self, on: bool) -> Result<()> {
        self.record(Command::SetPower(on))?;
        self.require_purifier("set_power")?;

        let mode = if on {
            read(&self.inner.restore_mode)
        } else {
            if let Some(current) = self.current_mode().filter(|m| m != modes::IDLE) {
                write(&self.inner.restore_mode, current);
            }
            modes::IDLE.to_string()
        };
        self.set_property(properties::POWER, if on { "on" } else { "off" });
        self.push(events::MODE, mode);
        Ok(())
    }

    async fn set_mode(&self, mode: &str) -> Result<()> {
        self.record(Command::SetMode(mode.to_string()))?;
        self.require_purifier("set_mode")?;

        if mode == modes::IDLE {
            self.set_property(properties::POWER, "off");
        } else {
            self.set_property(properties::POWER, "on");
            write(&self.inner.restore_mode, mode.to_string());
        }
        self.push(events::MODE, mode);
        Ok(())
    }

    async fn favorite_level(&self) -> Result<u8> {
        self.record(Command::FavoriteLevel)?;
        self.require_purifier("favorite_level")?;

        self.property(properties::FAVORITE_LEVEL)
            .and_then(|level| level.as_integer())
            .and_then(|level| u8::try_from(level).ok())
            .ok_or_else(|| DeviceError::InvalidResponse("favorite level missing".into()))
    }

    async fn set_favorite_level(&self, level: u8) -> Result<()> {
        self.record(Command::SetFavoriteLevel(level))?;
        self.require_purifier("set_favorite_level")?;

        if level > MAX_FAVORITE_LEVEL {
            return Err(DeviceError::rejected(
                "set_favorite_level",
                format!("level {} out of range", level),
            ));
        }
        self.set_property(properties::FAVORITE_LEVEL, level);
        Ok(())
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.record(Command::Call {
            method: method.to_string(),
            args: args.clone(),
        })?;

        if let Some(response) = self
            .inner
            .responses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
        {
            return Ok(response.clone());
        }

        match (self.inner.kind, method) {
            (DeviceKind::Camera, methods::GET_DEVICE_STATUS) => Ok(self.camera_status()),
            (DeviceKind::Camera, methods::SET_SYSTEM_STATUS) => self.set_system_status(&args),
            _ => Err(DeviceError::rejected(method, "unknown method")),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.event_tx.subscribe()
    }
}

struct ClientInner {
    devices: RwLock<HashMap<String, SimulatedDevice>>,
    refusals: AtomicU32,
    attempts: AtomicUsize,
}

/// Device client backed by simulated devices
#[derive(Clone)]
pub struct SimulatedClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for SimulatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let devices: Vec<String> = self
            .inner
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("SimulatedClient")
            .field("devices", &devices)
            .field("attempts", &self.connect_attempts())
            .finish()
    }
}

impl Default for SimulatedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedClient {
    /// Create a client with no devices
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClientInner {
                devices: RwLock::new(HashMap::new()),
                refusals: AtomicU32::new(0),
                attempts: AtomicUsize::new(0),
            }),
        }
    }

    /// Make a device reachable at its address
    pub fn add_device(&self, device: SimulatedDevice) {
        self.inner
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.address().to_string(), device);
    }

    /// The device at `address`, if any
    pub fn device(&self, address: &str) -> Option<SimulatedDevice> {
        self.inner
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// Refuse the next `count` connect attempts
    pub fn refuse_connections(&self, count: u32) {
        self.inner.refusals.store(count, Ordering::SeqCst);
    }

    /// Number of connect attempts made so far
    pub fn connect_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceClient for SimulatedClient {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&self, options: &DiscoveryOptions) -> Result<Arc<dyn DeviceSession>> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .inner
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DeviceError::CommunicationError(format!(
                "connection to {} refused",
                options.address
            )));
        }

        let device = self.device(&options.address).ok_or_else(|| {
            DeviceError::CommunicationError(format!("no device answered at {}", options.address))
        })?;

        let delay = read(&device.inner.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        Ok(Arc::new(device))
    }
}
