//! Snapshot loading: materialising an immutable [`MachineModelSnapshot`]
//! from a persistence collaborator at simulation start.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::types::{
    CommunicationBinding, Component, Connection, MachineModelSnapshot, SimulationMode,
};

/// Error types for model snapshot loading.
///
/// All-or-nothing: any variant aborts the simulation start.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// The requested model id does not exist.
    #[error("machine model {0} not found")]
    NotFound(u64),

    /// The persistence collaborator (or, for file-backed loaders, the
    /// filesystem) could not be reached or returned malformed data.
    #[error("failed to fetch machine model: {0}")]
    FetchFailed(String),

    /// The snapshot was fetched but failed a structural check (e.g. a
    /// binding whose `direction` wasn't `Read`/`Write`).
    #[error("invalid machine model: {0}")]
    Invalid(String),
}

/// Contract for fetching an immutable snapshot of a machine model.
///
/// `mode` controls whether bindings are fetched at all: [`SimulationMode::Pure`]
/// runs are not expected to touch the binding table.
pub trait SnapshotLoader {
    /// Load components, connections, and — only in [`SimulationMode::Hil`] —
    /// bindings for `model_id`.
    fn load(&self, model_id: u64, mode: SimulationMode) -> Result<MachineModelSnapshot, ModelError>;
}

/// On-disk representation of a machine model: one TOML document per model,
/// named `<model_id>.toml` under a root directory. Stands in for the
/// database-backed collaborator this engine is normally paired with.
#[derive(Debug, Clone, Deserialize)]
struct RawModel {
    #[serde(default)]
    components: Vec<Component>,
    #[serde(default)]
    connections: Vec<Connection>,
    #[serde(default)]
    bindings: Vec<CommunicationBinding>,
}

/// Loads machine models from TOML files on disk.
pub struct FileSnapshotLoader {
    root: PathBuf,
}

impl FileSnapshotLoader {
    /// Create a loader rooted at `root`; models are expected at
    /// `root/<model_id>.toml`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn model_path(&self, model_id: u64) -> PathBuf {
        self.root.join(format!("{model_id}.toml"))
    }
}

impl SnapshotLoader for FileSnapshotLoader {
    fn load(&self, model_id: u64, mode: SimulationMode) -> Result<MachineModelSnapshot, ModelError> {
        let path = self.model_path(model_id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModelError::NotFound(model_id)
            } else {
                ModelError::FetchFailed(e.to_string())
            }
        })?;

        let raw: RawModel =
            toml::from_str(&content).map_err(|e| ModelError::FetchFailed(e.to_string()))?;

        let bindings = if mode.is_hil() { raw.bindings } else { Vec::new() };
        if !mode.is_hil() && !raw.bindings.is_empty() {
            warn!(
                model_id,
                "ignoring {} communication binding(s) for a pure-mode simulation",
                raw.bindings.len()
            );
        }

        Ok(MachineModelSnapshot {
            components: raw.components,
            connections: raw.connections,
            bindings,
        })
    }
}

/// An in-memory snapshot loader, for tests and the "already loaded" case.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshotLoader {
    models: std::collections::HashMap<u64, MachineModelSnapshot>,
}

impl StaticSnapshotLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a snapshot under `model_id`.
    pub fn with_model(mut self, model_id: u64, snapshot: MachineModelSnapshot) -> Self {
        self.models.insert(model_id, snapshot);
        self
    }
}

impl SnapshotLoader for StaticSnapshotLoader {
    fn load(&self, model_id: u64, mode: SimulationMode) -> Result<MachineModelSnapshot, ModelError> {
        let snapshot = self.models.get(&model_id).cloned().ok_or(ModelError::NotFound(model_id))?;
        if mode.is_hil() {
            Ok(snapshot)
        } else {
            Ok(MachineModelSnapshot {
                bindings: Vec::new(),
                ..snapshot
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComponentKind, Direction};
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
        [[components]]
        id = 1
        name = "S"
        kind = "Sensor"

        [[components]]
        id = 2
        name = "H"
        kind = "Heater"

        [[connections]]
        machine_model_id = 1
        source_component_id = 1
        target_component_id = 2
        source_port = "value"
        target_port = "setpoint"

        [[bindings]]
        id = 1
        component_id = 2
        component_port = "setpoint"
        direction = "Read"
        endpoint_url = "opc.tcp://host:4840"
        address = "ns=2;s=Sp"
        "#
    }

    #[test]
    fn file_loader_pure_mode_drops_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(sample_toml().as_bytes()).unwrap();

        let loader = FileSnapshotLoader::new(dir.path());
        let snapshot = loader.load(1, SimulationMode::Pure).unwrap();
        assert_eq!(snapshot.components.len(), 2);
        assert_eq!(snapshot.connections.len(), 1);
        assert!(snapshot.bindings.is_empty());
    }

    #[test]
    fn file_loader_hil_mode_keeps_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let loader = FileSnapshotLoader::new(dir.path());
        let snapshot = loader.load(1, SimulationMode::Hil).unwrap();
        assert_eq!(snapshot.bindings.len(), 1);
        assert_eq!(snapshot.bindings[0].direction, Direction::Read);
    }

    #[test]
    fn file_loader_missing_model_returns_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileSnapshotLoader::new(dir.path());
        let err = loader.load(42, SimulationMode::Pure).unwrap_err();
        assert!(matches!(err, ModelError::NotFound(42)));
    }

    #[test]
    fn static_loader_roundtrips_registered_model() {
        let snapshot = MachineModelSnapshot {
            components: vec![Component {
                id: 1,
                name: "S".to_string(),
                kind: ComponentKind::Sensor,
                config: Default::default(),
            }],
            connections: vec![],
            bindings: vec![],
        };
        let loader = StaticSnapshotLoader::new().with_model(1, snapshot);
        let loaded = loader.load(1, SimulationMode::Pure).unwrap();
        assert_eq!(loaded.components.len(), 1);
    }
}
