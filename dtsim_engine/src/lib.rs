//! The step loop (C6) and simulation lifecycle manager (C7).
//!
//! This crate is the engine's orchestration layer: it owns no domain logic
//! of its own (that lives in `dtsim_scheduler`, `dtsim_kernels`,
//! `dtsim_fmu`, and `dtsim_opcua`) and instead sequences those crates once
//! per tick and across a simulation's lifetime.
//!
//! # Module Structure
//!
//! - [`state`] - `SimulationState`, `Status`, the mutable per-simulation runtime
//! - [`step`] - the per-tick orchestrator: gather, dispatch, publish, write
//! - [`manager`] - `SimulationManager`: spawn, status, stop, guaranteed cleanup
//! - [`error`] - `EngineError`, aggregating every collaborator's error taxonomy
//! - [`prelude`] - common re-exports

pub mod error;
pub mod manager;
pub mod prelude;
pub mod state;
pub mod step;
