//! Immutable machine model entities: `Component`, `Connection`,
//! `CommunicationBinding`, and the `MachineModelSnapshot` that bundles them.

use dtsim_common::value::ValueMap;
use serde::{Deserialize, Serialize};

/// The kind of a component, closed over the five kernel types this engine
/// implements plus the opaque `FMU` arm for third-party models.
///
/// `Unknown` catches any kind string the persistence collaborator might
/// hand back that this engine doesn't recognize; it is never produced
/// deliberately, only deserialized, and its kernel emits a diagnostic
/// output rather than failing the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ComponentKind {
    Sensor,
    Heater,
    Actuator,
    Valve,
    #[serde(rename = "FMU")]
    Fmu,
    #[serde(other)]
    Unknown,
}

/// A single simulation component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: u64,
    pub name: String,
    pub kind: ComponentKind,
    #[serde(default)]
    pub config: ValueMap,
}

/// A directed edge from one component's output port to another's input port.
///
/// A connection whose `source_port` or `target_port` is absent, or whose
/// endpoints are not both present in the snapshot, contributes no edge to
/// the scheduler and supplies no input to the kernel — callers should treat
/// it as silently skipped rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub machine_model_id: u64,
    pub source_component_id: u64,
    pub target_component_id: u64,
    #[serde(default)]
    pub source_port: Option<String>,
    #[serde(default)]
    pub target_port: Option<String>,
}

impl Connection {
    /// Whether this connection names both a source and target port.
    pub fn is_complete(&self) -> bool {
        self.source_port.is_some() && self.target_port.is_some()
    }
}

/// The direction of a communication binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Direction {
    Read,
    Write,
}

fn default_protocol() -> String {
    "OPCUA".to_string()
}

/// A declarative mapping between a component port and an external OPC UA
/// address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationBinding {
    pub id: u64,
    pub component_id: u64,
    pub component_port: String,
    pub direction: Direction,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub endpoint_url: String,
    pub address: String,
    #[serde(default)]
    pub config: Option<ValueMap>,
}

/// The execution mode a simulation was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// No external I/O; kernels alone drive the simulation.
    Pure,
    /// Hardware-in-the-loop; every tick brackets kernel execution with an
    /// OPC UA read and write.
    Hil,
}

impl SimulationMode {
    /// Whether this mode requires an OPC UA bridge.
    pub fn is_hil(&self) -> bool {
        matches!(self, SimulationMode::Hil)
    }
}

impl Default for SimulationMode {
    fn default() -> Self {
        SimulationMode::Pure
    }
}

/// An immutable copy of a machine model, captured at simulation start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineModelSnapshot {
    pub components: Vec<Component>,
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub bindings: Vec<CommunicationBinding>,
}

impl MachineModelSnapshot {
    /// Look up a component by id.
    pub fn component(&self, id: u64) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Read bindings for a given component, in snapshot order.
    pub fn read_bindings_for(&self, component_id: u64) -> impl Iterator<Item = &CommunicationBinding> {
        self.bindings
            .iter()
            .filter(move |b| b.component_id == component_id && b.direction == Direction::Read)
    }

    /// Write bindings for a given component, in snapshot order.
    pub fn write_bindings_for(&self, component_id: u64) -> impl Iterator<Item = &CommunicationBinding> {
        self.bindings
            .iter()
            .filter(move |b| b.component_id == component_id && b.direction == Direction::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_requires_both_ports() {
        let c = Connection {
            machine_model_id: 1,
            source_component_id: 1,
            target_component_id: 2,
            source_port: Some("value".to_string()),
            target_port: None,
        };
        assert!(!c.is_complete());
    }

    #[test]
    fn component_kind_serializes_fmu_uppercase() {
        let json = serde_json::to_string(&ComponentKind::Fmu).unwrap();
        assert_eq!(json, "\"FMU\"");
    }

    #[test]
    fn binding_protocol_defaults_to_opcua() {
        let json = r#"{
            "id": 1, "component_id": 1, "component_port": "setpoint",
            "direction": "Read", "endpoint_url": "opc.tcp://host:4840",
            "address": "ns=2;s=Sp"
        }"#;
        let binding: CommunicationBinding = serde_json::from_str(json).unwrap();
        assert_eq!(binding.protocol, "OPCUA");
    }

    #[test]
    fn snapshot_filters_bindings_by_component_and_direction() {
        let snapshot = MachineModelSnapshot {
            components: vec![],
            connections: vec![],
            bindings: vec![
                CommunicationBinding {
                    id: 1,
                    component_id: 10,
                    component_port: "setpoint".to_string(),
                    direction: Direction::Read,
                    protocol: default_protocol(),
                    endpoint_url: "opc.tcp://a".to_string(),
                    address: "ns=2;s=Sp".to_string(),
                    config: None,
                },
                CommunicationBinding {
                    id: 2,
                    component_id: 10,
                    component_port: "temperature".to_string(),
                    direction: Direction::Write,
                    protocol: default_protocol(),
                    endpoint_url: "opc.tcp://a".to_string(),
                    address: "ns=2;s=T".to_string(),
                    config: None,
                },
            ],
        };
        assert_eq!(snapshot.read_bindings_for(10).count(), 1);
        assert_eq!(snapshot.write_bindings_for(10).count(), 1);
        assert_eq!(snapshot.read_bindings_for(99).count(), 0);
    }
}
