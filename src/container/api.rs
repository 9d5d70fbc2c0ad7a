//! Daemon seam.
//!
//! The reuse state machine, the run orchestrator and the prune sweep only talk to the
//! daemon through [`ContainerApi`]. Everything they read back is copied into owned
//! snapshot types so that the core does not depend on a particular client library.

use crate::container::state::LifecycleState;
use crate::container::{Result, RunRequest};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Label/name filters passed to list operations, in Docker filter syntax.
pub type ListFilters = HashMap<String, Vec<String>>;

/// Operations the orchestration core needs from a container daemon.
///
/// Implementations must be safe to share between concurrent runs.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Create and start a container for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::AlreadyExists`](crate::container::ContainerError::AlreadyExists)
    /// when the requested name is taken. A container that was created but failed to start
    /// is removed before the error is returned.
    async fn run_container(&self, request: &RunRequest) -> Result<ContainerSnapshot>;

    /// Inspect a container by ID.
    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot>;

    /// Find a container whose name is exactly `name`.
    async fn container_by_name(&self, name: &str) -> Result<Option<ContainerSnapshot>>;

    /// Unpause a paused container.
    async fn unpause_container(&self, id: &str) -> Result<()>;

    /// Start a stopped container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Force-remove the container named exactly `name`. Succeeds if there is none.
    async fn remove_container_by_name(&self, name: &str) -> Result<()>;

    /// Remove a container and its anonymous volumes.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Arrange for the container to be stopped once `after` has elapsed.
    ///
    /// The timer must not depend on the caller's runtime staying alive.
    async fn expire_container(&self, id: &str, after: Duration) -> Result<()>;

    /// List containers (running or not) matching `filters`.
    async fn list_containers(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>>;

    /// List images matching `filters`.
    async fn list_images(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>>;

    /// Remove an image.
    async fn remove_image(&self, id: &str, force: bool) -> Result<()>;
}

/// A host address bound to a container port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortBinding {
    /// Host interface, e.g. `0.0.0.0`
    pub host_ip: String,
    /// Host port, as the daemon reports it
    pub host_port: String,
}

impl PortBinding {
    /// Bind `host_port` on all interfaces.
    pub fn any_interface(host_port: u16) -> Self {
        Self {
            host_ip: "0.0.0.0".to_string(),
            host_port: host_port.to_string(),
        }
    }
}

/// A container port the daemon actually published on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Port inside the container
    pub private_port: u16,
    /// Protocol (`tcp`, `udp`)
    pub protocol: String,
    /// Host interface
    pub host_ip: String,
    /// Port on the host
    pub public_port: u16,
}

/// Lifecycle flags from one inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Daemon status string (`running`, `exited`, `removing`, ...)
    pub status: String,
    pub running: bool,
    pub paused: bool,
    pub restarting: bool,
    pub oom_killed: bool,
    pub dead: bool,
}

impl StateSnapshot {
    /// Collapse the flags into a single lifecycle state.
    ///
    /// A paused container also reports `running`, so pause is checked first. The
    /// unusable flags win over `exited` because an OOM-killed container exits too.
    pub fn lifecycle(&self) -> LifecycleState {
        if self.paused {
            LifecycleState::Paused
        } else if self.oom_killed {
            LifecycleState::OomKilled
        } else if self.dead || self.status == "dead" {
            LifecycleState::Dead
        } else if self.status == "removing" {
            LifecycleState::RemovalInProgress
        } else if self.restarting || self.status == "restarting" {
            LifecycleState::Restarting
        } else if self.status == "exited" {
            LifecycleState::Exited
        } else if self.running {
            LifecycleState::Running
        } else {
            LifecycleState::Unknown(self.status.clone())
        }
    }
}

/// Everything the core reads from a single container inspection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSnapshot {
    /// Container ID
    pub id: String,
    /// Container name without the leading `/`
    pub name: String,
    /// Image reference the container was created from (`repository:tag`)
    pub image: String,
    /// Lifecycle flags
    pub state: StateSnapshot,
    /// Container labels
    pub labels: HashMap<String, String>,
    /// Exposed ports, e.g. `5432/tcp`
    pub exposed_ports: BTreeSet<String>,
    /// Requested port bindings by container port
    pub port_bindings: HashMap<String, Vec<PortBinding>>,
    /// Ports actually published on the host
    pub published_ports: Vec<PublishedPort>,
    /// Address on the default bridge network
    pub ip_address: Option<String>,
}

impl ContainerSnapshot {
    /// Lifecycle state at inspection time.
    pub fn lifecycle(&self) -> LifecycleState {
        self.state.lifecycle()
    }
}

/// ID and labels of a listed container or image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
}

impl ResourceSummary {
    /// Whether the resource carries `key=value`.
    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }
}
