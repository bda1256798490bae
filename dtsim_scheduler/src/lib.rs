//! Deterministic execution order for a machine model's component graph.
//!
//! Computes a topological order via Kahn's algorithm with FIFO tie-breaking,
//! and falls back to snapshot order when the graph has a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use dtsim_model::types::{Component, Connection, MachineModelSnapshot};
use thiserror::Error;
use tracing::warn;

/// Diagnostic describing a cycle detected during scheduling.
///
/// `remaining` lists the component ids that never reached in-degree zero —
/// i.e. the vertices participating in (or downstream of) the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInfo {
    pub remaining: Vec<u64>,
}

/// Scheduling failure. The only variant is a detected cycle; callers are
/// expected to fall back to snapshot order rather than abort.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cycle detected among components {remaining:?}", remaining = .0.remaining)]
pub struct SchedulerError(pub CycleInfo);

/// Compute a deterministic execution order for `components` given
/// `connections`.
///
/// Edges are `(source_component_id, target_component_id)`, restricted to
/// connections with both a source and target port specified and both
/// endpoints present in `components`; duplicate edges count toward
/// in-degree at most once. Ties among simultaneously-ready vertices break in
/// FIFO order of the initial queue, which is populated by iterating
/// `components` in snapshot order.
///
/// On cycle, returns `Err` carrying the [`CycleInfo`] diagnostic; callers
/// that want the "fall back to snapshot order" policy described for this
/// engine should use [`order_or_snapshot_order`] instead.
pub fn order(components: &[Component], connections: &[Connection]) -> Result<Vec<u64>, SchedulerError> {
    let ids: HashSet<u64> = components.iter().map(|c| c.id).collect();

    let mut edges: HashSet<(u64, u64)> = HashSet::new();
    for conn in connections {
        if !conn.is_complete() {
            continue;
        }
        if !ids.contains(&conn.source_component_id) || !ids.contains(&conn.target_component_id) {
            continue;
        }
        edges.insert((conn.source_component_id, conn.target_component_id));
    }

    let mut adjacency: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut in_degree: HashMap<u64, usize> = components.iter().map(|c| (c.id, 0)).collect();
    for &(src, dst) in &edges {
        adjacency.entry(src).or_default().push(dst);
        *in_degree.get_mut(&dst).expect("target id validated against component set") += 1;
    }

    let mut queue: VecDeque<u64> = components
        .iter()
        .filter(|c| in_degree[&c.id] == 0)
        .map(|c| c.id)
        .collect();

    let mut result = Vec::with_capacity(components.len());
    while let Some(id) = queue.pop_front() {
        result.push(id);
        if let Some(targets) = adjacency.get(&id) {
            for &target in targets {
                let degree = in_degree.get_mut(&target).expect("target id present in in_degree map");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if result.len() == components.len() {
        Ok(result)
    } else {
        let resolved: HashSet<u64> = result.into_iter().collect();
        let remaining: Vec<u64> = components
            .iter()
            .map(|c| c.id)
            .filter(|id| !resolved.contains(id))
            .collect();
        Err(SchedulerError(CycleInfo { remaining }))
    }
}

/// Like [`order`], but on a cycle logs the diagnostic and falls back to
/// snapshot order (the component ids in the order they appear in the
/// snapshot) instead of failing the simulation start.
pub fn order_or_snapshot_order(snapshot: &MachineModelSnapshot) -> Vec<u64> {
    match order(&snapshot.components, &snapshot.connections) {
        Ok(order) => order,
        Err(SchedulerError(info)) => {
            warn!(remaining = ?info.remaining, "cycle detected in component graph, falling back to snapshot order");
            snapshot.components.iter().map(|c| c.id).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsim_model::types::ComponentKind;

    fn component(id: u64) -> Component {
        Component {
            id,
            name: format!("c{id}"),
            kind: ComponentKind::Sensor,
            config: Default::default(),
        }
    }

    fn connection(source: u64, target: u64) -> Connection {
        Connection {
            machine_model_id: 1,
            source_component_id: source,
            target_component_id: target,
            source_port: Some("out".to_string()),
            target_port: Some("in".to_string()),
        }
    }

    #[test]
    fn linear_chain_orders_source_before_target() {
        let components = vec![component(1), component(2), component(3)];
        let connections = vec![connection(1, 2), connection(2, 3)];
        let result = order(&components, &connections).unwrap();
        assert_eq!(result, vec![1, 2, 3]);
    }

    #[test]
    fn independent_vertices_break_ties_in_snapshot_order() {
        let components = vec![component(3), component(1), component(2)];
        let result = order(&components, &[]).unwrap();
        assert_eq!(result, vec![3, 1, 2]);
    }

    #[test]
    fn duplicate_edges_do_not_inflate_in_degree() {
        let components = vec![component(1), component(2)];
        let connections = vec![connection(1, 2), connection(1, 2), connection(1, 2)];
        let result = order(&components, &connections).unwrap();
        assert_eq!(result, vec![1, 2]);
    }

    #[test]
    fn incomplete_connection_is_ignored() {
        let components = vec![component(1), component(2)];
        let mut connections = vec![connection(1, 2)];
        connections[0].target_port = None;
        // with no edges, both vertices are independently ready; snapshot order wins
        let result = order(&components, &connections).unwrap();
        assert_eq!(result, vec![1, 2]);
    }

    #[test]
    fn connection_to_unknown_component_is_ignored() {
        let components = vec![component(1)];
        let connections = vec![connection(1, 999)];
        let result = order(&components, &connections).unwrap();
        assert_eq!(result, vec![1]);
    }

    #[test]
    fn two_cycle_reports_both_vertices() {
        let components = vec![component(1), component(2)];
        let connections = vec![connection(1, 2), connection(2, 1)];
        let err = order(&components, &connections).unwrap_err();
        let mut remaining = err.0.remaining.clone();
        remaining.sort();
        assert_eq!(remaining, vec![1, 2]);
    }

    #[test]
    fn fallback_uses_snapshot_order_on_cycle() {
        let snapshot = MachineModelSnapshot {
            components: vec![component(1), component(2)],
            connections: vec![connection(1, 2), connection(2, 1)],
            bindings: vec![],
        };
        let result = order_or_snapshot_order(&snapshot);
        assert_eq!(result, vec![1, 2]);
    }

    #[test]
    fn acyclic_graph_respects_all_edges_regardless_of_branching() {
        // A feeds both B and C; D depends on both B and C.
        let components = vec![component(1), component(2), component(3), component(4)];
        let connections = vec![
            connection(1, 2),
            connection(1, 3),
            connection(2, 4),
            connection(3, 4),
        ];
        let result = order(&components, &connections).unwrap();
        let pos = |id: u64| result.iter().position(|&x| x == id).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(4));
        assert!(pos(3) < pos(4));
    }
}
