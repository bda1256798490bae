//! The mutable per-simulation runtime state (§3) and its status machine.

use std::collections::HashMap;
use std::time::Instant;

use dtsim_common::value::ValueMap;
use dtsim_fmu::FmuHost;
use dtsim_model::types::{MachineModelSnapshot, SimulationMode};
use dtsim_opcua::OpcUaBridge;
use serde::{Deserialize, Serialize};

/// A simulation's lifecycle status.
///
/// Transitions: `Pending -> Starting -> Running -> (Stopping -> Stopped |
/// Error)`. `Stopped` and `Error` are terminal.
///
/// Serializes to lowercase strings (`"pending"`, `"running"`, ...) to match
/// the reference Python service's wire values, preserving JSON
/// compatibility with the (out-of-scope) HTTP layer that would otherwise
/// need to translate between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl Status {
    /// Whether `stop()` should transition this status to `Stopping`.
    pub fn is_stoppable(&self) -> bool {
        matches!(self, Status::Starting | Status::Running)
    }

    /// Whether this status is terminal (`Stopped` or `Error`).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Stopped | Status::Error)
    }
}

/// Owns everything one running simulation needs: its immutable snapshot,
/// derived execution order, per-component state threaded across ticks, the
/// FMU instances and OPC UA bridge it exclusively owns, and its lifecycle
/// status.
///
/// The lifecycle manager exclusively owns each `SimulationState`; the step
/// loop holds a write lock on it for the duration of a tick; status queries
/// take a read lock. See [`crate::manager::SharedState`].
pub struct SimulationState {
    pub id: u64,
    pub model_id: u64,
    pub mode: SimulationMode,
    pub status: Status,
    pub start_time: Option<Instant>,
    pub snapshot: MachineModelSnapshot,
    pub execution_order: Vec<u64>,
    pub component_states: HashMap<u64, ValueMap>,
    pub fmu_instances: FmuHost,
    pub bridge: Option<OpcUaBridge>,
    pub error: Option<String>,
}

impl SimulationState {
    /// Seconds elapsed since `start_time`, or `0.0` before the simulation
    /// has started (during `Starting` setup).
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}
