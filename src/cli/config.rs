//! Configuration discovery and loading
//!
//! This module handles the configuration discovery hierarchy:
//! 1. Current directory: ./tcontainer.toml or ./.tcontainer/config.toml
//! 2. User config: ~/.tcontainer/config.toml
//! 3. System config: /etc/tcontainer/config.toml
//! 4. Built-in defaults

use crate::container::{
    ContainerClientConfig, ContainerError, ExponentialBackoff, Result, RunOption, options,
};
use crate::env::{self, defaults};
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcontainerConfig {
    pub client: ContainerClientConfig,
    pub run: RunDefaults,
}

/// Defaults applied to every `run` before command line options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDefaults {
    /// Seconds until a container is stopped; 0 keeps it until removed
    pub expiry_secs: u64,
    pub auto_remove: bool,
    /// Seconds to wait for an existing container to become reusable
    pub reuse_timeout_secs: u64,
    /// Seconds to wait for the readiness probe
    pub probe_timeout_secs: u64,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            expiry_secs: defaults::CONTAINER_EXPIRY.as_secs(),
            auto_remove: defaults::AUTO_REMOVE,
            reuse_timeout_secs: defaults::REUSE_TIMEOUT.as_secs(),
            probe_timeout_secs: defaults::PROBE_TIMEOUT.as_secs(),
        }
    }
}

impl RunDefaults {
    /// Leading options for a run request.
    pub fn to_options(&self) -> Vec<RunOption> {
        let expiry = (self.expiry_secs > 0).then(|| Duration::from_secs(self.expiry_secs));

        vec![
            options::with_expiry(expiry),
            options::with_auto_remove(self.auto_remove),
            options::with_reuse_backoff(
                ExponentialBackoff::reuse_default()
                    .with_max_elapsed_time(Some(Duration::from_secs(self.reuse_timeout_secs))),
            ),
            options::with_probe_backoff(
                ExponentialBackoff::probe_default()
                    .with_max_elapsed_time(Some(Duration::from_secs(self.probe_timeout_secs))),
            ),
        ]
    }
}

impl TcontainerConfig {
    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ContainerError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ContainerError::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Configuration discovery system
pub struct ConfigDiscovery;

impl ConfigDiscovery {
    /// Load `override_path` if given, otherwise discover through the hierarchy
    pub fn load(override_path: Option<&Path>) -> Result<TcontainerConfig> {
        match override_path {
            Some(path) => {
                info!("Loading configuration override from: {:?}", path);
                TcontainerConfig::from_toml_file(path)
            }
            None => Self::discover_config(),
        }
    }

    /// Discover and load configuration using the hierarchy
    pub fn discover_config() -> Result<TcontainerConfig> {
        if let Some(config_path) = Self::find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            return TcontainerConfig::from_toml_file(config_path);
        }

        debug!("No configuration file found, using defaults");
        Ok(TcontainerConfig::default())
    }

    /// Find configuration file using discovery hierarchy
    pub fn find_config_file() -> Option<PathBuf> {
        Self::get_config_candidates()
            .into_iter()
            .inspect(|candidate| debug!("Checking for config file: {:?}", candidate))
            .find(|candidate| candidate.is_file())
    }

    /// Get list of configuration file candidates in priority order
    fn get_config_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = std_env::current_dir() {
            candidates.extend(Self::candidates_in(&current_dir));
        }

        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(env::nested_config_file_path(&home_dir));
        }

        #[cfg(unix)]
        candidates.push(PathBuf::from(env::SYSTEM_CONFIG_DIR).join(env::NESTED_CONFIG_FILE_NAME));

        candidates
    }

    fn candidates_in(dir: &Path) -> [PathBuf; 2] {
        [
            dir.join(env::CONFIG_FILE_NAME),
            env::nested_config_file_path(dir),
        ]
    }

    /// Get home directory path
    fn get_home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Show configuration discovery information for debugging
    pub fn show_discovery_info() {
        println!("Configuration Discovery Hierarchy:");
        println!();

        for (i, candidate) in Self::get_config_candidates().iter().enumerate() {
            let status = if candidate.is_file() {
                "✓ EXISTS"
            } else if candidate.exists() {
                "✗ NOT A FILE"
            } else {
                "✗ NOT FOUND"
            };

            println!("  {}. {:?} - {}", i + 1, candidate, status);
        }

        println!();
        if let Some(found) = Self::find_config_file() {
            println!("Active configuration: {:?}", found);
        } else {
            println!("Active configuration: Built-in defaults");
        }
    }
}
