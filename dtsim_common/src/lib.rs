//! Digital Twin Common Library
//!
//! Shared value model, configuration loading, and constants used across
//! the `dtsim` workspace.
//!
//! # Module Structure
//!
//! - [`value`] - The `Value` type used for component config and ports
//! - [`config`] - Engine configuration loading (TOML)
//! - [`consts`] - Shared default constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use dtsim_common::prelude::*;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod value;
