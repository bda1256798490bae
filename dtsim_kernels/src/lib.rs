//! Per-type component update kernels.
//!
//! Every kernel has the signature `update(current_time, config, inputs,
//! prev_state) -> new_state`. Kernels are pure functions of their
//! arguments; the step loop is responsible for threading `prev_state`
//! across ticks. `FMU` components are not dispatched here — they're hosted
//! by `dtsim_fmu`, which exposes the same update shape.

use dtsim_common::value::{number_or, string_or, ValueMap};
use dtsim_model::types::ComponentKind;
use serde_json::json;
use tracing::warn;

/// Seconds since simulation start, as seen by a kernel.
pub type SimTime = f64;

/// Discrete tick size used by every kernel (`Δt = 1 s`).
pub const TICK_SECONDS: f64 = 1.0;

/// Dispatch a component update to its kernel by kind.
///
/// `Fmu` components are not handled here; callers should route those to
/// `dtsim_fmu::FmuHost` instead. Any other unrecognized kind is mapped to
/// [`unknown_kernel`] rather than erroring the step loop.
pub fn execute(
    kind: ComponentKind,
    current_time: SimTime,
    config: &ValueMap,
    inputs: &ValueMap,
    prev_state: &ValueMap,
) -> ValueMap {
    match kind {
        ComponentKind::Sensor => sensor(current_time, config),
        ComponentKind::Heater => heater(config, inputs, prev_state),
        ComponentKind::Actuator => actuator(config, inputs),
        ComponentKind::Valve => valve(config, inputs),
        ComponentKind::Fmu => {
            warn!("dtsim_kernels::execute called with ComponentKind::Fmu; route FMU components through dtsim_fmu instead");
            unknown_kernel()
        }
        ComponentKind::Unknown => unknown_kernel(),
    }
}

/// Fallback for kinds with no kernel implementation. Never errors — always
/// produces a diagnostic output so the step loop can continue.
pub fn unknown_kernel() -> ValueMap {
    let mut out = ValueMap::new();
    out.insert("status".to_string(), json!("unknown_type"));
    out
}

/// `Sensor`: `value = offset + amplitude · sin(2π · frequency · t)`, where
/// `t` is seconds since simulation start.
fn sensor(current_time: SimTime, config: &ValueMap) -> ValueMap {
    let frequency = number_or(config, "frequency", 0.1);
    let amplitude = number_or(config, "amplitude", 1.0);
    let offset = number_or(config, "offset", 0.0);

    let value = offset + amplitude * (2.0 * std::f64::consts::PI * frequency * current_time).sin();

    let mut out = ValueMap::new();
    out.insert("value".to_string(), json!(value));
    out
}

/// `Heater`: a discrete thermal step toward an effective setpoint, clamped
/// so it never overshoots the setpoint and the cooling floor never drops
/// below `ambient_temp`.
fn heater(config: &ValueMap, inputs: &ValueMap, prev_state: &ValueMap) -> ValueMap {
    let config_setpoint = number_or(config, "setpoint", 50.0);
    let heating_rate = number_or(config, "heating_rate", 5.0);
    let cooling_rate = number_or(config, "cooling_rate", 1.0);
    let ambient_temp = number_or(config, "ambient_temp", 20.0);
    let initial_temp = number_or(config, "initial_temp", ambient_temp);

    let setpoint = inputs
        .get("setpoint")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(config_setpoint);

    let current_temp = prev_state
        .get("temperature")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(initial_temp);

    let new_temp = if current_temp < setpoint {
        (current_temp + heating_rate * TICK_SECONDS).min(setpoint)
    } else if current_temp > setpoint {
        (current_temp - cooling_rate * TICK_SECONDS).max(ambient_temp.max(setpoint))
    } else {
        current_temp
    };

    let mut out = ValueMap::new();
    out.insert("temperature".to_string(), json!(new_temp));
    out
}

/// `Actuator`: `On` iff `command >= threshold`; missing or non-numeric
/// input is treated as `Off`.
fn actuator(config: &ValueMap, inputs: &ValueMap) -> ValueMap {
    let threshold = number_or(config, "threshold", 0.5);
    let command = inputs.get("command").and_then(serde_json::Value::as_f64);

    let status = match command {
        Some(c) if c >= threshold => "On",
        _ => "Off",
    };

    let mut out = ValueMap::new();
    out.insert("status".to_string(), json!(status));
    out
}

/// `Valve`: `Flow = 1.0` iff `ControlSignal > threshold` (strict); else
/// `0.0`.
fn valve(config: &ValueMap, inputs: &ValueMap) -> ValueMap {
    let threshold = number_or(config, "threshold", 0.5);
    let control_signal = inputs.get("ControlSignal").and_then(serde_json::Value::as_f64);

    let flow = match control_signal {
        Some(c) if c > threshold => 1.0,
        _ => 0.0,
    };

    let mut out = ValueMap::new();
    out.insert("Flow".to_string(), json!(flow));
    out
}

/// Reads a string config value with a default — re-exported so callers
/// assembling kernel configs from raw persistence rows don't need a direct
/// `dtsim_common` dependency just for this helper.
pub fn string_config<'a>(config: &'a ValueMap, key: &str, default: &'a str) -> &'a str {
    string_or(config, key, default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, f64)]) -> ValueMap {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    #[test]
    fn sine_sensor_one_tick() {
        let cfg = config(&[("frequency", 0.25), ("amplitude", 2.0), ("offset", 1.0)]);
        let out = sensor(1.0, &cfg);
        let value = out["value"].as_f64().unwrap();
        assert!((value - 3.0).abs() < 1e-9, "expected ~3.0, got {value}");
    }

    #[test]
    fn heater_heats_toward_setpoint_from_initial_temp() {
        let cfg = config(&[("heating_rate", 10.0), ("initial_temp", 15.0)]);
        let out = heater(&cfg, &ValueMap::new(), &ValueMap::new());
        // no setpoint input -> config default 50.0; first tick has no prior temperature -> initial_temp
        assert_eq!(out["temperature"].as_f64().unwrap(), 25.0);
    }

    #[test]
    fn heater_prefers_input_setpoint_over_config() {
        let cfg = config(&[("setpoint", 50.0), ("heating_rate", 10.0)]);
        let mut prev = ValueMap::new();
        prev.insert("temperature".to_string(), json!(25.0));
        let mut inputs = ValueMap::new();
        inputs.insert("setpoint".to_string(), json!(38.54));
        let out = heater(&cfg, &inputs, &prev);
        assert_eq!(out["temperature"].as_f64().unwrap(), 35.0);
    }

    #[test]
    fn heater_cooling_floor_never_drops_below_ambient() {
        let cfg = config(&[
            ("setpoint", 20.0),
            ("cooling_rate", 50.0),
            ("ambient_temp", 20.0),
        ]);
        let mut prev = ValueMap::new();
        prev.insert("temperature".to_string(), json!(90.0));
        let out = heater(&cfg, &ValueMap::new(), &prev);
        assert_eq!(out["temperature"].as_f64().unwrap(), 20.0);
    }

    #[test]
    fn heater_at_setpoint_is_unchanged() {
        let cfg = config(&[("setpoint", 50.0)]);
        let mut prev = ValueMap::new();
        prev.insert("temperature".to_string(), json!(50.0));
        let out = heater(&cfg, &ValueMap::new(), &prev);
        assert_eq!(out["temperature"].as_f64().unwrap(), 50.0);
    }

    #[test]
    fn actuator_off_without_command() {
        let cfg = config(&[("threshold", 40.0)]);
        let out = actuator(&cfg, &ValueMap::new());
        assert_eq!(out["status"], json!("Off"));
    }

    #[test]
    fn actuator_on_at_exact_threshold() {
        let cfg = config(&[("threshold", 40.0)]);
        let mut inputs = ValueMap::new();
        inputs.insert("command".to_string(), json!(40.0));
        let out = actuator(&cfg, &inputs);
        assert_eq!(out["status"], json!("On"));
    }

    #[test]
    fn valve_requires_strictly_greater_than_threshold() {
        let cfg = config(&[("threshold", 0.5)]);
        let mut inputs = ValueMap::new();
        inputs.insert("ControlSignal".to_string(), json!(0.5));
        let out = valve(&cfg, &inputs);
        assert_eq!(out["Flow"].as_f64().unwrap(), 0.0);

        inputs.insert("ControlSignal".to_string(), json!(0.51));
        let out = valve(&cfg, &inputs);
        assert_eq!(out["Flow"].as_f64().unwrap(), 1.0);
    }

    #[test]
    fn unknown_kind_yields_diagnostic_not_error() {
        let out = execute(ComponentKind::Unknown, 0.0, &ValueMap::new(), &ValueMap::new(), &ValueMap::new());
        assert_eq!(out["status"], json!("unknown_type"));
    }
}
