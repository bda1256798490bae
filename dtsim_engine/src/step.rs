//! The per-tick orchestrator (C6).
//!
//! Data flow per tick: external read -> gather inputs from the *previous*
//! tick's state -> execute each component's kernel in scheduled order ->
//! publish outputs -> external write. Internal inputs intentionally read
//! `prev_states` rather than this tick's in-progress outputs: that's what
//! makes a tick a pure functional update over a vector of values,
//! independent of iteration order for acyclic graphs, and keeps cycles
//! computable with single-tick delay semantics (§4.6, §9).

use std::collections::HashMap;

use dtsim_common::value::{Value, ValueMap};
use dtsim_model::types::{ComponentKind, Connection, MachineModelSnapshot};

use crate::state::SimulationState;

/// Run exactly one tick against `state`: gather, dispatch, publish, write.
pub async fn tick(state: &mut SimulationState) {
    let t = state.elapsed_secs();

    let external = match state.bridge.as_ref() {
        Some(bridge) => bridge.read(),
        None => HashMap::new(),
    };

    let prev_states = state.component_states.clone();
    let mut next_states: HashMap<u64, ValueMap> = HashMap::with_capacity(state.execution_order.len());

    for &comp_id in &state.execution_order {
        let Some(component) = state.snapshot.component(comp_id) else {
            continue;
        };

        let mut inputs = gather_internal_inputs(&state.snapshot.connections, comp_id, &prev_states);
        overlay_external_inputs(&state.snapshot, comp_id, &external, &mut inputs);

        let prev_state = prev_states.get(&comp_id);
        let output = if component.kind == ComponentKind::Fmu {
            state.fmu_instances.step(comp_id, t, &inputs)
        } else {
            let empty = ValueMap::new();
            dtsim_kernels::execute(component.kind, t, &component.config, &inputs, prev_state.unwrap_or(&empty))
        };

        next_states.insert(comp_id, output);
    }

    if let Some(bridge) = state.bridge.as_ref() {
        let batch = build_write_batch(&state.snapshot, &next_states);
        bridge.write(&batch).await;
    }

    // Merge: keys absent from `next_states` (components not in the
    // execution order, e.g. an empty snapshot) are preserved unchanged.
    state.component_states.extend(next_states);
}

/// For each connection targeting `target_id` with both ports specified,
/// bind the source's previous-tick output (if any) to the target port.
fn gather_internal_inputs(
    connections: &[Connection],
    target_id: u64,
    prev_states: &HashMap<u64, ValueMap>,
) -> ValueMap {
    let mut inputs = ValueMap::new();
    for conn in connections {
        if conn.target_component_id != target_id || !conn.is_complete() {
            continue;
        }
        let source_port = conn.source_port.as_deref().expect("checked by is_complete");
        let target_port = conn.target_port.as_deref().expect("checked by is_complete");

        if let Some(value) = prev_states.get(&conn.source_component_id).and_then(|m| m.get(source_port)) {
            inputs.insert(target_port.to_string(), value.clone());
        }
    }
    inputs
}

/// Overlay every `Read` binding targeting `comp_id` onto `inputs`, using the
/// value the bridge had cached at gather time. HIL overrides internal when
/// both exist.
fn overlay_external_inputs(
    snapshot: &MachineModelSnapshot,
    comp_id: u64,
    external: &HashMap<u64, Value>,
    inputs: &mut ValueMap,
) {
    for binding in snapshot.read_bindings_for(comp_id) {
        if let Some(value) = external.get(&binding.id) {
            inputs.insert(binding.component_port.clone(), value.clone());
        }
    }
}

/// Build this tick's write batch from every `Write` binding whose source
/// port produced a value in `next_states`.
fn build_write_batch(snapshot: &MachineModelSnapshot, next_states: &HashMap<u64, ValueMap>) -> HashMap<u64, Value> {
    let mut batch = HashMap::new();
    for binding in snapshot.bindings.iter().filter(|b| b.direction == dtsim_model::types::Direction::Write) {
        if let Some(value) = next_states.get(&binding.component_id).and_then(|m| m.get(&binding.component_port)) {
            batch.insert(binding.id, value.clone());
        }
    }
    batch
}
