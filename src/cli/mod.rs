//! CLI-specific functionality for tcontainer
//!
//! This module contains argument parsing, configuration discovery and the HTTP
//! readiness probe used by `tcontainer run`.

pub mod args;
pub mod config;
pub mod probe;

pub use args::{Args, ExecutionMode, HttpProbe, PruneConfig, RunConfig};
pub use config::{ConfigDiscovery, RunDefaults, TcontainerConfig};
pub use probe::http_readiness;
