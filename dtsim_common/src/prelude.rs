//! Convenience re-exports. `use dtsim_common::prelude::*;` pulls in the
//! types most crates in the workspace need.

// ─── Configuration ──────────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, EngineConfig, LogLevel};

// ─── Constants ──────────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_OPCUA_TIMEOUT, DEFAULT_PUBLISH_INTERVAL, DEFAULT_TICK_INTERVAL};

// ─── Value model ────────────────────────────────────────────────────────
pub use crate::value::{as_number, number_or, string_or, Value, ValueMap};
