//! Aggregated error taxonomy for the lifecycle manager's public surface.

use dtsim_fmu::FmuError;
use dtsim_model::loader::ModelError;
use dtsim_opcua::BridgeError;
use thiserror::Error;

/// Errors the lifecycle manager can surface to its caller.
///
/// `Model`, `Fmu`, and `Bridge` are all [`crate::manager::SimulationManager::start`]
/// failures (§7 `LoadError`/`BridgeError`) — by the time one of these
/// reaches the caller, every already-loaded FMU and bridge session for that
/// attempt has already been torn down. `NotFound` is the only variant
/// `stop`/`status` can produce; it corresponds to §7's `LifecycleError` for
/// an unknown simulation id.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Snapshot fetch failed. Fatal at start.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// An `FMU`-kind component failed to load or instantiate. Fatal at start.
    #[error(transparent)]
    Fmu(#[from] FmuError),

    /// No OPC UA endpoint could be reached for a HIL start. Fatal at start.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// No simulation is registered under this id.
    #[error("simulation {0} not found")]
    NotFound(u64),
}
