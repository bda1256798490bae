//! Loads, steps, and tears down FMI 2.0 Co-Simulation models, mapping
//! component ports to FMU variables by name.

mod handle;

use std::collections::HashMap;
use std::path::Path;

use dtsim_common::value::{string_or, Value, ValueMap};
use dtsim_model::types::Component;
use fmi::fmi2::instance::{Common, CoSimulation};
use fmi::fmi2::schema::{Causality, ScalarVariable, ScalarVariableElement};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use handle::FmuHandle;

/// Tick size used for every `doStep` call (`Δt = 1 s`).
pub const TICK_SECONDS: f64 = 1.0;

/// Error type for FMU loading and instantiation.
///
/// Both variants are fatal at simulation start: any already-loaded FMU must
/// be torn down before the caller reports `Error`. `doStep` failures are
/// *not* represented here — they surface as a `{status: "error_doStep_.."}`
/// output value so the step loop can continue.
#[derive(Debug, Clone, Error)]
pub enum FmuError {
    /// The component's config has no usable `fmu_path`.
    #[error("component {0} has no fmu_path configured")]
    MissingPath(u64),

    /// Unpacking the archive or parsing its model description failed.
    #[error("failed to load FMU: {0}")]
    LoadFailed(String),

    /// `fmi2Instantiate` returned a null component.
    #[error("failed to instantiate FMU: {0}")]
    InstantiationFailed(String),
}

/// Owns every FMU instance for one simulation. Never shared across
/// simulations; dropping an entry (or the whole host) runs
/// `terminate`+`freeInstance` via [`FmuHandle`]'s destructor.
#[derive(Default)]
pub struct FmuHost {
    handles: HashMap<u64, FmuHandle>,
}

impl FmuHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and instantiate the FMU for an `FMU`-kind component.
    ///
    /// Uses `component.name` as the FMI instance name. Setup / enter /
    /// exit-initialization-mode calls are intentionally omitted: the
    /// binding's own defaults are used for them.
    pub fn load(&mut self, component: &Component) -> Result<(), FmuError> {
        let fmu_path = string_or(&component.config, "fmu_path", "");
        if fmu_path.is_empty() {
            return Err(FmuError::MissingPath(component.id));
        }

        let handle = FmuHandle::load(Path::new(fmu_path), &component.name)?;
        self.handles.insert(component.id, handle);
        Ok(())
    }

    /// Write `inputs` by name, call `doStep`, and read back every `output`
    /// variable — or emit a diagnostic if the instance is missing or the
    /// step fails.
    pub fn step(&mut self, component_id: u64, current_time: f64, inputs: &ValueMap) -> ValueMap {
        let Some(handle) = self.handles.get_mut(&component_id) else {
            warn!(component_id, "no FMU instance loaded for component");
            return diagnostic("error_fmu_not_found");
        };

        write_inputs(handle, inputs);

        let step_result = CoSimulation::do_step(handle.instance_mut(), current_time, TICK_SECONDS, true);
        match step_result {
            Ok(_) => read_outputs(handle),
            Err(e) => {
                let code = format!("{e:?}").to_lowercase();
                warn!(component_id, error = %e, "FMU doStep failed");
                diagnostic(&format!("error_doStep_{code}"))
            }
        }
    }

    /// Terminate and free one FMU instance, if loaded.
    pub fn teardown(&mut self, component_id: u64) {
        self.handles.remove(&component_id);
    }

    /// Terminate and free every loaded instance.
    pub fn teardown_all(&mut self) {
        self.handles.clear();
    }

    /// Whether any FMU instance is still owned by this host.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

fn diagnostic(status: &str) -> ValueMap {
    let mut out = ValueMap::new();
    out.insert("status".to_string(), json!(status));
    out
}

fn find_variable<'a>(handle: &'a FmuHandle, name: &str) -> Option<&'a ScalarVariable> {
    handle
        .model_description()
        .get_model_variables()
        .find(|v| v.name == name)
}

/// Write each input port present in `inputs` to its matching FMU variable,
/// coercing by declared type. Variables of a type we don't map are skipped
/// with a warning; unmatched port names are silently ignored (not every
/// input need be wired to this FMU).
fn write_inputs(handle: &mut FmuHandle, inputs: &ValueMap) {
    for (port, value) in inputs {
        let Some(variable) = find_variable(handle, port) else {
            continue;
        };
        let vr = variable.value_reference;
        let elem = variable.elem.clone();
        let instance = handle.instance_mut();

        match elem {
            ScalarVariableElement::Real(_) => {
                if let Some(v) = value.as_f64() {
                    let _ = instance.set_real(&[vr], &[v]);
                } else {
                    warn!(port, "expected numeric value for Real FMU input");
                }
            }
            ScalarVariableElement::Integer(_) | ScalarVariableElement::Enumeration => {
                if let Some(v) = value.as_i64() {
                    let _ = instance.set_integer(&[vr], &[v as i32]);
                } else {
                    warn!(port, "expected integer value for Integer/Enumeration FMU input");
                }
            }
            ScalarVariableElement::Boolean(_) => {
                if let Some(v) = value.as_bool() {
                    let _ = instance.set_boolean(&[vr], &[v as i32]);
                } else {
                    warn!(port, "expected boolean value for Boolean FMU input");
                }
            }
            ScalarVariableElement::String => {
                warn!(port, "String FMU variables are not supported, skipping");
            }
        }
    }
}

/// Read every variable with causality `output`, coercing by declared type
/// into the port's new state.
fn read_outputs(handle: &mut FmuHandle) -> ValueMap {
    let outputs: Vec<(String, u32, ScalarVariableElement)> = handle
        .model_description()
        .get_model_variables()
        .filter(|v| v.causality == Causality::Output)
        .map(|v| (v.name.clone(), v.value_reference, v.elem.clone()))
        .collect();

    let instance = handle.instance_mut();
    let mut out = ValueMap::new();
    for (name, vr, elem) in outputs {
        let value: Option<Value> = match elem {
            ScalarVariableElement::Real(_) => {
                let mut buf = [0.0];
                instance.get_real(&[vr], &mut buf).ok().map(|_| json!(buf[0]))
            }
            ScalarVariableElement::Integer(_) | ScalarVariableElement::Enumeration => {
                let mut buf = [0i32];
                instance
                    .get_integer(&[vr], &mut buf)
                    .ok()
                    .map(|_| json!(buf[0] as i64))
            }
            ScalarVariableElement::Boolean(_) => {
                let mut buf = [0i32];
                instance
                    .get_boolean(&[vr], &mut buf)
                    .ok()
                    .map(|_| json!(buf[0] != 0))
            }
            ScalarVariableElement::String => {
                warn!(name, "String FMU outputs are not supported, skipping");
                None
            }
        };
        if let Some(value) = value {
            out.insert(name, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_model::types::ComponentKind;

    fn fmu_component(id: u64, fmu_path: &str) -> Component {
        let mut config = ValueMap::new();
        if !fmu_path.is_empty() {
            config.insert("fmu_path".to_string(), json!(fmu_path));
        }
        Component {
            id,
            name: format!("fmu{id}"),
            kind: ComponentKind::Fmu,
            config,
        }
    }

    #[test]
    fn load_without_fmu_path_is_missing_path_error() {
        let mut host = FmuHost::new();
        let err = host.load(&fmu_component(1, "")).unwrap_err();
        assert!(matches!(err, FmuError::MissingPath(1)));
    }

    #[test]
    fn step_without_loaded_instance_yields_diagnostic() {
        let mut host = FmuHost::new();
        let out = host.step(99, 1.0, &ValueMap::new());
        assert_eq!(out["status"], json!("error_fmu_not_found"));
    }

    #[test]
    fn teardown_all_on_empty_host_is_a_no_op() {
        let mut host = FmuHost::new();
        host.teardown_all();
        assert!(host.is_empty());
    }
}
