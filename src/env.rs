//! Process-wide constants for tcontainer.
//!
//! This module centralizes the ownership label, option defaults and configuration
//! file locations so that the library and the CLI agree on them.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key and value of the label attached to every container this crate creates.
///
/// Prune and cleanup operations only ever touch resources carrying
/// `tcontainer=tcontainer`.
pub const OWNERSHIP_LABEL: &str = "tcontainer";

/// Run option defaults.
pub mod defaults {
    use super::Duration;

    /// Image tag used when none is given.
    pub const IMAGE_TAG: &str = "latest";

    /// Containers stop after this long unless the expiry is overridden.
    pub const CONTAINER_EXPIRY: Duration = Duration::from_secs(60);

    /// Whether the daemon removes a container once it stops.
    pub const AUTO_REMOVE: bool = true;

    /// Reuse backoff: first wait between repair polls.
    pub const REUSE_INITIAL_INTERVAL: Duration = Duration::from_secs(1);

    /// Reuse backoff: longest wait between repair polls.
    pub const REUSE_MAX_INTERVAL: Duration = Duration::from_secs(1);

    /// Reuse backoff: total time spent waiting for an existing container.
    ///
    /// Kept below the 30s default timeout that most test harnesses apply.
    pub const REUSE_TIMEOUT: Duration = Duration::from_secs(20);

    /// Readiness probe backoff: first wait between probes.
    pub const PROBE_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

    /// Readiness probe backoff: longest wait between probes.
    pub const PROBE_MAX_INTERVAL: Duration = Duration::from_secs(5);

    /// Readiness probe backoff: total time spent waiting for readiness.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

    /// Growth factor between consecutive backoff intervals.
    pub const BACKOFF_MULTIPLIER: f64 = 1.5;

    /// Jitter applied to every backoff interval, as a fraction of the interval.
    pub const BACKOFF_RANDOMIZATION: f64 = 0.5;

    /// Seconds the daemon waits for a graceful stop when a container expires.
    pub const STOP_TIMEOUT_SECS: i64 = 10;
}

/// Configuration file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "tcontainer.toml";

/// Hidden directory holding per-project and per-user configuration.
pub const CONFIG_DIR_NAME: &str = ".tcontainer";

/// File name inside [`CONFIG_DIR_NAME`] and the system config directory.
pub const NESTED_CONFIG_FILE_NAME: &str = "config.toml";

/// System-wide configuration directory.
pub const SYSTEM_CONFIG_DIR: &str = "/etc/tcontainer";

/// Build the `.tcontainer` directory path under `root`.
pub fn config_dir_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR_NAME)
}

/// Build the nested `config.toml` path under `root`.
pub fn nested_config_file_path(root: &Path) -> PathBuf {
    config_dir_path(root).join(NESTED_CONFIG_FILE_NAME)
}
