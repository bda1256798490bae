//! Shared default constants.
//!
//! These were hard-coded in the original Python service; here they are
//! defaults for [`crate::config::EngineConfig`] and remain overridable.

use std::time::Duration;

/// Default step-loop tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default OPC UA subscription publishing interval.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

/// Default bound on a single OPC UA client operation.
pub const DEFAULT_OPCUA_TIMEOUT: Duration = Duration::from_secs(10);
