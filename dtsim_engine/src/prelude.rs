//! Convenience re-exports.

pub use crate::error::EngineError;
pub use crate::manager::{SharedState, SimulationManager, StatusView};
pub use crate::state::{SimulationState, Status};
