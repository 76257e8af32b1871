/*!
 * Camera accessors.
 *
 * The camera pushes nothing, so On is read from a bulk status query every
 * time and written with a sleep/wake command.
 */
use std::sync::Arc;

use tracing::debug;

use mibridge_core::types::Value;
use mibridge_devices::profile::methods;

use crate::characteristic::{Access, Characteristic, CharacteristicId};
use crate::context::AccessoryContext;
use crate::convert;
use crate::error::{AccessoryError, Result};

/// Fields requested from `get_devicestatus`
const STATUS_FIELDS: [&str; 6] = [
    "alarmsensitivity",
    "infraredlight",
    "cameraprompt",
    "ledstatus",
    "wakeuplevel",
    "recordtype",
];

/// Characteristic bindings for the camera switch
pub fn bindings(ctx: &Arc<AccessoryContext>) -> Vec<Characteristic> {
    let get_ctx = ctx.clone();
    let set_ctx = ctx.clone();
    vec![Characteristic::new(
        CharacteristicId::On,
        Access::read_write(
            move || on(get_ctx.clone()),
            move |value| set_on(set_ctx.clone(), value),
        ),
    )]
}

async fn store_power(ctx: &AccessoryContext, on: bool) {
    let mut state = ctx.state().await;
    state.power_on = Some(on);
    ctx.values().update(CharacteristicId::On, on);
}

async fn on(ctx: Arc<AccessoryContext>) -> Result<Value> {
    let session = ctx.session()?;
    let query = Value::object(STATUS_FIELDS.iter().map(|field| (*field, "")));
    let status = session
        .call(methods::GET_DEVICE_STATUS, vec![query])
        .await
        .map_err(|e| ctx.command_failed(e))?;

    let on = convert::camera_power(&status)
        .ok_or_else(|| AccessoryError::UnrecognizedStatus(status.to_string()))?;
    debug!("get On: {}", on);

    store_power(&ctx, on).await;
    Ok(Value::Bool(on))
}

async fn set_on(ctx: Arc<AccessoryContext>, value: Value) -> Result<()> {
    let session = ctx.session()?;
    let on = value.as_bool().ok_or_else(|| {
        AccessoryError::invalid(CharacteristicId::On, format!("expected a boolean, got {}", value))
    })?;
    let cmd = if on { "normal" } else { "sleep" };
    debug!("set On: {} -> {}", on, cmd);

    session
        .call(methods::SET_SYSTEM_STATUS, vec![Value::object([("cmd", cmd)])])
        .await
        .map_err(|e| ctx.command_failed(e))?;

    store_power(&ctx, on).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mibridge_core::event::SharedEventBus;
    use mibridge_core::types::Id;
    use mibridge_devices::devices::simulated::{Command, SimulatedClient, SimulatedDevice};
    use mibridge_devices::{DiscoveryOptions, RetryPolicy, SessionManager};

    use crate::characteristic::CharacteristicValues;

    async fn connected(device: &SimulatedDevice) -> Arc<AccessoryContext> {
        let client = SimulatedClient::new();
        client.add_device(device.clone());
        let sessions = SessionManager::new(
            Arc::new(client),
            DiscoveryOptions::new(device.address(), "token"),
            RetryPolicy::default(),
        );
        sessions.discover().await;
        let values = CharacteristicValues::new(Id::from("camera"), SharedEventBus::new());
        Arc::new(AccessoryContext::new(sessions, values))
    }

    #[tokio::test]
    async fn test_read_awake_camera() {
        let camera = SimulatedDevice::camera("10.0.3.1");
        let ctx = connected(&camera).await;

        assert_eq!(on(ctx.clone()).await.unwrap(), Value::Bool(true));
        assert_eq!(ctx.state().await.power_on, Some(true));
        assert_eq!(ctx.values().get(CharacteristicId::On), Some(Value::Bool(true)));

        let commands = camera.commands();
        let Command::Call { method, args } = &commands[0] else {
            panic!("expected a method call");
        };
        assert_eq!(method, "get_devicestatus");
        let query = args[0].as_object().unwrap();
        assert_eq!(query.len(), 6);
        assert_eq!(query.get("wakeuplevel"), Some(&Value::from("")));
    }

    #[tokio::test]
    async fn test_write_puts_camera_to_sleep() {
        let camera = SimulatedDevice::camera("10.0.3.2");
        let ctx = connected(&camera).await;

        set_on(ctx.clone(), Value::Bool(false)).await.unwrap();

        assert_eq!(
            camera.commands(),
            vec![Command::Call {
                method: "set_sysstatus".into(),
                args: vec![Value::object([("cmd", "sleep")])],
            }]
        );
        assert_eq!(on(ctx).await.unwrap(), Value::Bool(false));
    }

    #[tokio::test]
    async fn test_read_sleeping_camera() {
        let camera = SimulatedDevice::camera("10.0.3.5");
        camera.set_sleeping(true);
        let ctx = connected(&camera).await;

        assert_eq!(on(ctx.clone()).await.unwrap(), Value::Bool(false));
        assert_eq!(ctx.state().await.power_on, Some(false));
    }

    #[tokio::test]
    async fn test_unrecognized_status() {
        let camera = SimulatedDevice::camera("10.0.3.3");
        camera.set_response(
            "get_devicestatus",
            Value::Array(vec![Value::object([("wakeuplevel", "1")])]),
        );
        let ctx = connected(&camera).await;

        let err = on(ctx.clone()).await.unwrap_err();
        assert!(matches!(err, AccessoryError::UnrecognizedStatus(_)));
        assert_eq!(ctx.state().await.power_on, None);
    }

    #[tokio::test]
    async fn test_write_requires_boolean() {
        let camera = SimulatedDevice::camera("10.0.3.4");
        let ctx = connected(&camera).await;

        let err = set_on(ctx, Value::from("on")).await.unwrap_err();
        assert!(matches!(err, AccessoryError::InvalidValue { .. }));
        assert!(camera.commands().is_empty());
    }
}
