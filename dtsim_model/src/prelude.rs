//! Convenience re-exports.

pub use crate::loader::{FileSnapshotLoader, ModelError, SnapshotLoader, StaticSnapshotLoader};
pub use crate::types::{
    CommunicationBinding, Component, ComponentKind, Connection, Direction, MachineModelSnapshot,
    SimulationMode,
};
