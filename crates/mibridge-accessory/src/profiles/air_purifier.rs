/*!
 * Air purifier accessors.
 *
 * Reads answer from the last-known state, except RotationSpeed which asks
 * the device for its favorite level. Writes go to the device; local state
 * only changes once the device has confirmed.
 */
use std::sync::Arc;

use tracing::{debug, warn};

use mibridge_core::types::Value;

use crate::characteristic::{Access, Characteristic, CharacteristicId};
use crate::context::AccessoryContext;
use crate::convert::{self, Mode, TargetAirPurifierState};
use crate::error::{AccessoryError, Result};

/// Characteristic bindings for the air purifier services
pub fn bindings(ctx: &Arc<AccessoryContext>) -> Vec<Characteristic> {
    macro_rules! get {
        ($f:ident) => {{
            let ctx = ctx.clone();
            move || $f(ctx.clone())
        }};
    }
    macro_rules! set {
        ($f:ident) => {{
            let ctx = ctx.clone();
            move |value| $f(ctx.clone(), value)
        }};
    }

    type Id = CharacteristicId;
    vec![
        Characteristic::new(Id::Active, Access::read_write(get!(active), set!(set_active))),
        Characteristic::new(Id::CurrentAirPurifierState, Access::read(get!(current_state))),
        Characteristic::new(
            Id::TargetAirPurifierState,
            Access::read_write(get!(target_state), set!(set_target_state)),
        ),
        Characteristic::new(
            Id::RotationSpeed,
            Access::read_write(get!(rotation_speed), set!(set_rotation_speed)),
        ),
        Characteristic::new(Id::AirQuality, Access::read(get!(air_quality))),
        Characteristic::new(Id::Pm25Density, Access::read(get!(pm25_density))),
        Characteristic::new(Id::CurrentTemperature, Access::read(get!(temperature))),
        Characteristic::new(Id::CurrentRelativeHumidity, Access::read(get!(humidity))),
    ]
}

async fn current_mode(ctx: &AccessoryContext, id: CharacteristicId) -> Result<Mode> {
    ctx.session()?;
    let mode = ctx.state().await.mode.clone();
    mode.ok_or(AccessoryError::ValueUnknown(id))
}

fn integer_arg(id: CharacteristicId, value: &Value) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.is_finite() => Ok(f.round() as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(AccessoryError::invalid(id, format!("expected a number, got {}", other))),
    }
}

async fn active(ctx: Arc<AccessoryContext>) -> Result<Value> {
    let mode = current_mode(&ctx, CharacteristicId::Active).await?;
    let active = convert::active_for(&mode);
    debug!("get Active: mode {} -> {:?}", mode, active);
    Ok(active.into())
}

async fn set_active(ctx: Arc<AccessoryContext>, value: Value) -> Result<()> {
    let session = ctx.session()?;
    let on = integer_arg(CharacteristicId::Active, &value)? != 0;
    debug!("set Active: power {}", if on { "on" } else { "off" });

    // The device pushes the resulting mode; nothing to update here
    session.set_power(on).await.map_err(|e| ctx.command_failed(e))
}

async fn current_state(ctx: Arc<AccessoryContext>) -> Result<Value> {
    let mode = current_mode(&ctx, CharacteristicId::CurrentAirPurifierState).await?;
    let state = convert::current_state_for(&mode);
    debug!("get CurrentAirPurifierState: mode {} -> {:?}", mode, state);
    Ok(state.into())
}

async fn target_state(ctx: Arc<AccessoryContext>) -> Result<Value> {
    let mode = current_mode(&ctx, CharacteristicId::TargetAirPurifierState).await?;
    let target = convert::target_state_for(&mode);
    debug!("get TargetAirPurifierState: mode {} -> {:?}", mode, target);
    Ok(target.into())
}

async fn set_target_state(ctx: Arc<AccessoryContext>, value: Value) -> Result<()> {
    let session = ctx.session()?;
    let id = CharacteristicId::TargetAirPurifierState;
    let code = integer_arg(id, &value)?;
    let target = TargetAirPurifierState::from_code(code)
        .ok_or_else(|| AccessoryError::invalid(id, format!("unknown target state {}", code)))?;
    let mode = convert::mode_for_target(target);
    debug!("set TargetAirPurifierState: {:?} -> mode {}", target, mode);

    session
        .set_mode(mode.as_str())
        .await
        .map_err(|e| ctx.command_failed(e))?;

    let mut state = ctx.state().await;
    state.mode = Some(mode);
    ctx.push_mode(&state);
    Ok(())
}

async fn rotation_speed(ctx: Arc<AccessoryContext>) -> Result<Value> {
    let session = ctx.session()?;
    let level = session
        .favorite_level()
        .await
        .map_err(|e| ctx.command_failed(e))?;
    let speed = convert::to_speed(level);
    debug!("get RotationSpeed: level {} -> {}%", level, speed);
    Ok(Value::from(speed))
}

/// Switch to favorite mode if needed, then set the level.
///
/// The mode switch is awaited before the level command so the device sees
/// them in order. A failed mode switch is logged and does not stop the level
/// command.
async fn set_rotation_speed(ctx: Arc<AccessoryContext>, value: Value) -> Result<()> {
    let session = ctx.session()?;
    let id = CharacteristicId::RotationSpeed;
    let speed = integer_arg(id, &value)?;
    let level = u8::try_from(speed)
        .ok()
        .and_then(convert::to_level)
        .ok_or_else(|| AccessoryError::invalid(id, format!("speed {} outside 0..=100", speed)))?;

    let mode = ctx.state().await.mode.clone();
    if mode != Some(Mode::Favorite) {
        debug!("set RotationSpeed: switching to favorite mode first");
        match session.set_mode(Mode::Favorite.as_str()).await {
            Ok(()) => {
                let mut state = ctx.state().await;
                state.mode = Some(Mode::Favorite);
                ctx.push_mode(&state);
            }
            Err(e) => {
                warn!("set RotationSpeed: switch to favorite mode failed: {}", e);
                ctx.sessions().report_failure(&e);
            }
        }
    }

    debug!("set RotationSpeed: {}% -> level {}", speed, level);
    session
        .set_favorite_level(level)
        .await
        .map_err(|e| ctx.command_failed(e))
}

async fn air_quality(ctx: Arc<AccessoryContext>) -> Result<Value> {
    ctx.session()?;
    let aqi = ctx.state().await.aqi;
    let quality = convert::air_quality_for(aqi);
    debug!("get AirQuality: aqi {:?} -> {:?}", aqi, quality);
    Ok(quality.into())
}

async fn pm25_density(ctx: Arc<AccessoryContext>) -> Result<Value> {
    ctx.session()?;
    let aqi = ctx.state().await.aqi;
    debug!("get PM2_5Density: {:?}", aqi);
    aqi.map(Value::from)
        .ok_or(AccessoryError::ValueUnknown(CharacteristicId::Pm25Density))
}

async fn temperature(ctx: Arc<AccessoryContext>) -> Result<Value> {
    ctx.session()?;
    let temperature = ctx.state().await.temperature;
    debug!("get CurrentTemperature: {:?}", temperature);
    temperature
        .map(Value::from)
        .ok_or(AccessoryError::ValueUnknown(CharacteristicId::CurrentTemperature))
}

async fn humidity(ctx: Arc<AccessoryContext>) -> Result<Value> {
    ctx.session()?;
    let humidity = ctx.state().await.humidity;
    debug!("get CurrentRelativeHumidity: {:?}", humidity);
    humidity
        .map(Value::from)
        .ok_or(AccessoryError::ValueUnknown(CharacteristicId::CurrentRelativeHumidity))
}
