//! The simulation lifecycle manager (C7).
//!
//! Registry of active simulations by id; spawn, status query, cooperative
//! stop, and guaranteed cleanup on every exit path (normal stop, setup
//! failure, panic).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dtsim_common::prelude::EngineConfig;
use dtsim_common::value::ValueMap;
use dtsim_fmu::FmuHost;
use dtsim_model::loader::SnapshotLoader;
use dtsim_model::types::{ComponentKind, SimulationMode};
use dtsim_opcua::OpcUaBridge;
use futures::FutureExt;
use parking_lot::RwLock as SyncRwLock;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::EngineError;
use crate::state::{SimulationState, Status};
use crate::step;

/// A simulation's state, shared between the manager, the spawned step
/// loop, and any concurrent status query. The step loop holds the write
/// lock for the duration of a tick; everything else takes it briefly.
pub type SharedState = Arc<RwLock<SimulationState>>;

/// Read-only snapshot of a simulation's status, returned by
/// [`SimulationManager::status`]. Mirrors the `get_status` response shape
/// of §6 (`machine_model_id`, `start_time`, `error`, `component_states`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusView {
    pub simulation_id: u64,
    pub status: Status,
    pub machine_model_id: u64,
    /// Seconds elapsed since the simulation entered `Running`; `0.0` if it
    /// has not started running yet.
    pub start_time_elapsed_secs: f64,
    pub error: Option<String>,
    pub component_states: HashMap<u64, ValueMap>,
}

/// Owns every active simulation; the single addressable owner of both the
/// id counter and (indirectly, per simulation) the OPC UA bridge — see the
/// "no global `CommunicationService`" decision in `DESIGN.md`.
pub struct SimulationManager {
    loader: Arc<dyn SnapshotLoader + Send + Sync>,
    config: EngineConfig,
    next_id: AtomicU64,
    simulations: SyncRwLock<HashMap<u64, SharedState>>,
}

impl SimulationManager {
    pub fn new(loader: Arc<dyn SnapshotLoader + Send + Sync>, config: EngineConfig) -> Self {
        Self {
            loader,
            config,
            next_id: AtomicU64::new(1),
            simulations: SyncRwLock::new(HashMap::new()),
        }
    }

    /// Allocate an id, load the snapshot, schedule, load FMUs, initialize
    /// the bridge (HIL only), and spawn the step loop. Any setup failure
    /// tears down whatever was already loaded and returns the error
    /// without spawning a loop.
    pub async fn start(&self, model_id: u64, mode: SimulationMode) -> Result<u64, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let snapshot = self.loader.load(model_id, mode)?;
        let execution_order = dtsim_scheduler::order_or_snapshot_order(&snapshot);
        let component_states = snapshot.components.iter().map(|c| (c.id, ValueMap::new())).collect();

        let state = SimulationState {
            id,
            model_id,
            mode,
            status: Status::Starting,
            start_time: None,
            snapshot,
            execution_order,
            component_states,
            fmu_instances: FmuHost::new(),
            bridge: None,
            error: None,
        };
        let shared: SharedState = Arc::new(RwLock::new(state));
        self.simulations.write().insert(id, shared.clone());

        let setup_result = {
            let mut guard = shared.write().await;
            setup(&mut guard, &self.config).await
        };

        if let Err(e) = setup_result {
            let mut guard = shared.write().await;
            guard.status = Status::Error;
            guard.error = Some(e.to_string());
            cleanup(&mut guard).await;
            return Err(e);
        }

        {
            let mut guard = shared.write().await;
            guard.status = Status::Running;
            guard.start_time = Some(Instant::now());
        }

        info!(simulation_id = id, model_id, ?mode, "simulation started");
        self.spawn_loop(id, shared);
        Ok(id)
    }

    /// Read-only status view for `id`, or `None` if unknown.
    pub async fn status(&self, id: u64) -> Option<StatusView> {
        let shared = self.simulations.read().get(&id).cloned()?;
        let guard = shared.read().await;
        Some(StatusView {
            simulation_id: guard.id,
            status: guard.status,
            machine_model_id: guard.model_id,
            start_time_elapsed_secs: guard.elapsed_secs(),
            error: guard.error.clone(),
            component_states: guard.component_states.clone(),
        })
    }

    /// Request a stop. If `Starting`/`Running`, marks `Stopping` (the step
    /// loop observes this at the next tick boundary and exits) and returns
    /// `Ok(true)`. If already terminal, schedules a disconnect as a safety
    /// net and returns `Ok(false)` (idempotent no-op: the HTTP collaborator
    /// maps this to "not stoppable"). `Err(NotFound)` for an unknown id.
    pub async fn stop(&self, id: u64) -> Result<bool, EngineError> {
        let shared = self.simulations.read().get(&id).cloned().ok_or(EngineError::NotFound(id))?;

        let mut guard = shared.write().await;
        if guard.status.is_stoppable() {
            guard.status = Status::Stopping;
            return Ok(true);
        }

        if guard.status.is_terminal() {
            if let Some(mut bridge) = guard.bridge.take() {
                drop(guard);
                bridge.disconnect_all().await;
            }
            return Ok(false);
        }

        // `Pending`: not yet schedulable, nothing to stop.
        Ok(false)
    }

    fn spawn_loop(&self, id: u64, shared: SharedState) {
        let tick_interval = self.config.tick_interval();
        tokio::spawn(run_loop(id, shared, tick_interval));
    }
}

/// Load every `FMU`-kind component's instance and, for a HIL start,
/// initialize the OPC UA bridge. On any failure, already-loaded FMUs are
/// torn down before the error is returned (§4.1, §4.7).
async fn setup(state: &mut SimulationState, config: &EngineConfig) -> Result<(), EngineError> {
    for component in &state.snapshot.components {
        if component.kind != ComponentKind::Fmu {
            continue;
        }
        if let Err(e) = state.fmu_instances.load(component) {
            state.fmu_instances.teardown_all();
            return Err(EngineError::from(e));
        }
    }

    if state.mode.is_hil() {
        let mut bridge = OpcUaBridge::new(config.opcua_timeout())?;
        if let Err(e) = bridge.initialize(&state.snapshot.bindings, config.opcua_publish_interval()) {
            state.fmu_instances.teardown_all();
            return Err(EngineError::from(e));
        }
        state.bridge = Some(bridge);
    }

    Ok(())
}

/// Terminate/free every FMU instance and disconnect the bridge, if any.
/// Called on every exit path: normal stop, setup failure, and — via
/// `run_loop`'s panic guard — a panicking tick.
async fn cleanup(state: &mut SimulationState) {
    state.fmu_instances.teardown_all();
    if let Some(mut bridge) = state.bridge.take() {
        bridge.disconnect_all().await;
    }
}

/// The spawned per-simulation task: runs ticks until `Stopping` is
/// observed, then guarantees cleanup regardless of how the loop exited.
async fn run_loop(id: u64, shared: SharedState, tick_interval: Duration) {
    let outcome = std::panic::AssertUnwindSafe(tick_loop(&shared, tick_interval))
        .catch_unwind()
        .await;

    if let Err(panic) = outcome {
        let reason = panic_message(panic.as_ref());
        error!(simulation_id = id, reason = %reason, "simulation step loop panicked");
        let mut guard = shared.write().await;
        guard.status = Status::Error;
        guard.error = Some(reason);
    }

    let mut guard = shared.write().await;
    cleanup(&mut guard).await;
    if guard.status != Status::Error {
        guard.status = Status::Stopped;
    }
    info!(simulation_id = id, status = ?guard.status, "simulation loop exited, cleanup complete");
}

async fn tick_loop(shared: &SharedState, tick_interval: Duration) {
    loop {
        {
            let mut guard = shared.write().await;
            step::tick(&mut guard).await;
        }

        let should_stop = shared.read().await.status == Status::Stopping;
        if should_stop {
            break;
        }

        tokio::time::sleep(tick_interval).await;
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "simulation task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_model::loader::StaticSnapshotLoader;
    use dtsim_model::types::{Component, ComponentKind, MachineModelSnapshot};
    use serde_json::json;

    fn sensor_snapshot() -> MachineModelSnapshot {
        let mut config = ValueMap::new();
        config.insert("frequency".to_string(), json!(0.1));
        MachineModelSnapshot {
            components: vec![Component { id: 1, name: "S".to_string(), kind: ComponentKind::Sensor, config }],
            connections: vec![],
            bindings: vec![],
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            tick_interval_ms: 10,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn start_transitions_to_running_and_status_reports_it() {
        let loader = Arc::new(StaticSnapshotLoader::new().with_model(1, sensor_snapshot()));
        let manager = SimulationManager::new(loader, fast_config());

        let id = manager.start(1, SimulationMode::Pure).await.unwrap();
        let status = manager.status(id).await.unwrap();
        assert_eq!(status.status, Status::Running);
        assert_eq!(status.machine_model_id, 1);

        manager.stop(id).await.unwrap();
    }

    #[tokio::test]
    async fn start_unknown_model_fails_without_registering_a_running_loop() {
        let loader = Arc::new(StaticSnapshotLoader::new());
        let manager = SimulationManager::new(loader, fast_config());

        let err = manager.start(999, SimulationMode::Pure).await.unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));
    }

    #[tokio::test]
    async fn status_of_unknown_id_is_none() {
        let loader = Arc::new(StaticSnapshotLoader::new());
        let manager = SimulationManager::new(loader, fast_config());
        assert!(manager.status(42).await.is_none());
    }

    #[tokio::test]
    async fn stop_unknown_id_is_not_found() {
        let loader = Arc::new(StaticSnapshotLoader::new());
        let manager = SimulationManager::new(loader, fast_config());
        let err = manager.stop(42).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(42)));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_produces_exactly_one_transition_to_stopped() {
        let loader = Arc::new(StaticSnapshotLoader::new().with_model(1, sensor_snapshot()));
        let manager = SimulationManager::new(loader, fast_config());

        let id = manager.start(1, SimulationMode::Pure).await.unwrap();
        assert_eq!(manager.stop(id).await.unwrap(), true);

        // Give the loop a moment to observe `Stopping` and exit.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = manager.status(id).await.unwrap();
        assert_eq!(status.status, Status::Stopped);

        // Second stop on the now-terminal simulation is a no-op.
        assert_eq!(manager.stop(id).await.unwrap(), false);
        let status_after = manager.status(id).await.unwrap();
        assert_eq!(status_after.status, Status::Stopped);
    }
}
