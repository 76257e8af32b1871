/*!
 * Property event bridge.
 *
 * Carries device-pushed property changes into the accessory state and on to
 * the characteristics derived from them. Started by the discovery hook for
 * every new session; primes the state from the session's property snapshot
 * before listening.
 */
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn, Instrument};

use mibridge_core::logging::component_span;
use mibridge_core::types::Value;
use mibridge_devices::profile::{events, properties};
use mibridge_devices::{DeviceEvent, DeviceSession};

use crate::characteristic::CharacteristicId;
use crate::context::AccessoryContext;
use crate::convert;

/// Snapshot properties used for priming, with the event each one stands for
const PRIMED: [(&str, &str); 4] = [
    (properties::MODE, events::MODE),
    (properties::AQI, events::PM2_5),
    (properties::TEMPERATURE, events::TEMPERATURE),
    (properties::HUMIDITY, events::RELATIVE_HUMIDITY),
];

/// Apply one property change to the state and push what derives from it.
///
/// Returns false when the event is not one the bridge handles or its value
/// could not be parsed.
pub async fn apply(ctx: &AccessoryContext, event: &str, value: &Value) -> bool {
    match event {
        events::MODE => {
            let Some(mode) = convert::parse_mode(value) else {
                warn!("bridge: ignoring mode {}", value);
                return false;
            };
            debug!("bridge: mode {}", mode);
            let mut state = ctx.state().await;
            state.mode = Some(mode);
            ctx.push_mode(&state);
        }
        events::PM2_5 => {
            let Some(aqi) = convert::parse_aqi(value) else {
                warn!("bridge: ignoring pm2.5 {}", value);
                return false;
            };
            debug!("bridge: pm2.5 {}", aqi);
            let mut state = ctx.state().await;
            state.aqi = Some(aqi);
            ctx.push_air_quality(&state);
        }
        events::TEMPERATURE => {
            let Some(temperature) = convert::parse_temperature(value) else {
                warn!("bridge: ignoring temperature {}", value);
                return false;
            };
            debug!("bridge: temperature {}", temperature);
            let mut state = ctx.state().await;
            state.temperature = Some(temperature);
            ctx.values()
                .update(CharacteristicId::CurrentTemperature, temperature);
        }
        events::RELATIVE_HUMIDITY => {
            let Some(humidity) = convert::parse_humidity(value) else {
                warn!("bridge: ignoring relative humidity {}", value);
                return false;
            };
            debug!("bridge: relative humidity {}", humidity);
            let mut state = ctx.state().await;
            state.humidity = Some(humidity);
            ctx.values()
                .update(CharacteristicId::CurrentRelativeHumidity, humidity);
        }
        other => {
            trace!("bridge: ignoring event {}", other);
            return false;
        }
    }
    true
}

/// Load the session's property snapshot into the state
pub async fn prime(ctx: &AccessoryContext, session: &dyn DeviceSession) -> usize {
    let mut primed = 0;
    for (property, event) in PRIMED {
        if let Some(value) = session.property(property) {
            if apply(ctx, event, &value).await {
                primed += 1;
            }
        }
    }
    debug!("bridge: primed {} properties", primed);
    primed
}

/// Prime from `session` and then follow its pushed changes until the stream
/// closes.
pub fn spawn(ctx: Arc<AccessoryContext>, session: Arc<dyn DeviceSession>) -> JoinHandle<()> {
    // Subscribe before priming so no change falls between the two
    let mut rx = session.subscribe();
    let span = component_span("bridge", Some(session.address()));

    tokio::spawn(
        async move {
            prime(&ctx, session.as_ref()).await;
            info!("bridge: listening for property changes");

            loop {
                match rx.recv().await {
                    Ok(DeviceEvent::PropertyChanged { property, value }) => {
                        apply(&ctx, &property, &value).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("bridge: fell behind, skipped {} property changes", skipped);
                    }
                    Err(RecvError::Closed) => {
                        info!("bridge: property stream closed");
                        break;
                    }
                }
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mibridge_core::event::SharedEventBus;
    use mibridge_core::types::Id;
    use mibridge_devices::devices::simulated::{SimulatedClient, SimulatedDevice};
    use mibridge_devices::{DiscoveryOptions, RetryPolicy, SessionManager};

    use crate::characteristic::CharacteristicValues;
    use crate::convert::Mode;

    fn context(address: &str, client: SimulatedClient) -> AccessoryContext {
        let sessions = SessionManager::new(
            Arc::new(client),
            DiscoveryOptions::new(address, "token"),
            RetryPolicy::default(),
        );
        AccessoryContext::new(
            sessions,
            CharacteristicValues::new(Id::from(address), SharedEventBus::new()),
        )
    }

    #[tokio::test]
    async fn test_idle_mode_pushes_three_characteristics() {
        let ctx = context("10.0.4.1", SimulatedClient::new());

        assert!(apply(&ctx, "mode", &Value::from("idle")).await);

        let values = ctx.values();
        assert_eq!(values.get(CharacteristicId::Active), Some(Value::Integer(0)));
        assert_eq!(
            values.get(CharacteristicId::CurrentAirPurifierState),
            Some(Value::Integer(0))
        );
        assert_eq!(
            values.get(CharacteristicId::TargetAirPurifierState),
            Some(Value::Integer(1))
        );
    }

    #[tokio::test]
    async fn test_pm25_pushes_band_and_density() {
        let ctx = context("10.0.4.2", SimulatedClient::new());

        assert!(apply(&ctx, "pm2.5", &Value::Integer(120)).await);

        assert_eq!(ctx.state().await.aqi, Some(120));
        assert_eq!(ctx.values().get(CharacteristicId::AirQuality), Some(Value::Integer(3)));
        assert_eq!(ctx.values().get(CharacteristicId::Pm25Density), Some(Value::Integer(120)));
    }

    #[tokio::test]
    async fn test_same_mode_twice_is_stable() {
        let ctx = context("10.0.4.3", SimulatedClient::new());

        apply(&ctx, "mode", &Value::from("favorite")).await;
        let first = ctx.state().await.clone();
        apply(&ctx, "mode", &Value::from("favorite")).await;

        assert_eq!(*ctx.state().await, first);
        assert_eq!(
            ctx.values().get(CharacteristicId::TargetAirPurifierState),
            Some(Value::Integer(0))
        );
    }

    #[tokio::test]
    async fn test_unparseable_values_are_ignored() {
        let ctx = context("10.0.4.4", SimulatedClient::new());

        assert!(!apply(&ctx, "temperature", &Value::from("warm")).await);
        assert!(!apply(&ctx, "led", &Value::from("on")).await);
        assert!(apply(&ctx, "temperature", &Value::from("23.5")).await);
        assert!(apply(&ctx, "relativeHumidity", &Value::Integer(52)).await);

        let state = ctx.state().await;
        assert_eq!(state.temperature, Some(23.5));
        assert_eq!(state.humidity, Some(52));
    }

    #[tokio::test]
    async fn test_prime_from_snapshot() {
        let device = SimulatedDevice::air_purifier("10.0.4.5");
        device.set_property("aqi", 75);
        let ctx = context("10.0.4.5", SimulatedClient::new());

        assert_eq!(prime(&ctx, &device).await, 4);

        let state = ctx.state().await;
        assert_eq!(state.mode, Some(Mode::Auto));
        assert_eq!(state.aqi, Some(75));
        assert_eq!(state.temperature, Some(22.5));
        assert_eq!(state.humidity, Some(45));
    }

    #[test_log::test(tokio::test)]
    async fn test_follows_pushed_changes() {
        let device = SimulatedDevice::air_purifier("10.0.4.6");
        let client = SimulatedClient::new();
        client.add_device(device.clone());
        let ctx = Arc::new(context("10.0.4.6", client));

        let handle = spawn(ctx.clone(), Arc::new(device.clone()));
        tokio::task::yield_now().await;

        device.push("mode", "idle");
        device.push("pm2.5", 210);

        for _ in 0..100 {
            if ctx.state().await.aqi == Some(210) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(ctx.state().await.mode, Some(Mode::Idle));
        assert_eq!(ctx.values().get(CharacteristicId::AirQuality), Some(Value::Integer(5)));
        handle.abort();
    }
}
