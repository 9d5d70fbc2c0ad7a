//! In-memory daemon used by the orchestration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tcontainer::container::{
    ContainerApi, ContainerError, ContainerSnapshot, ListFilters, PublishedPort,
    ResourceSummary, RunRequest, StateSnapshot,
};
use tcontainer::container::{ExponentialBackoff, Result};

/// Short, jitter-free schedule so retry loops finish quickly.
pub fn fast_backoff(budget_ms: u64) -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(5),
        Duration::from_millis(10),
        Some(Duration::from_millis(budget_ms)),
    )
    .without_jitter()
}

pub fn running() -> StateSnapshot {
    StateSnapshot {
        status: "running".to_string(),
        running: true,
        ..Default::default()
    }
}

pub fn paused() -> StateSnapshot {
    StateSnapshot {
        status: "paused".to_string(),
        running: true,
        paused: true,
        ..Default::default()
    }
}

pub fn exited() -> StateSnapshot {
    StateSnapshot {
        status: "exited".to_string(),
        ..Default::default()
    }
}

pub fn restarting() -> StateSnapshot {
    StateSnapshot {
        status: "restarting".to_string(),
        restarting: true,
        ..Default::default()
    }
}

pub fn oom_killed() -> StateSnapshot {
    StateSnapshot {
        status: "exited".to_string(),
        oom_killed: true,
        ..Default::default()
    }
}

pub fn dead() -> StateSnapshot {
    StateSnapshot {
        status: "dead".to_string(),
        dead: true,
        ..Default::default()
    }
}

/// A status the classifier does not model.
pub fn created() -> StateSnapshot {
    StateSnapshot {
        status: "created".to_string(),
        ..Default::default()
    }
}

pub fn removing() -> StateSnapshot {
    StateSnapshot {
        status: "removing".to_string(),
        ..Default::default()
    }
}

/// Number of calls the fake received, per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Calls {
    pub run: usize,
    pub lookup: usize,
    pub unpause: usize,
    pub start: usize,
    pub remove: usize,
    pub remove_by_name: usize,
    pub remove_image: usize,
    pub expire: usize,
}

/// State change applied after a number of lookups, to model slow transitions.
struct PendingTransition {
    name: String,
    lookups_left: usize,
    state: StateSnapshot,
}

#[derive(Default)]
struct Inner {
    containers: Vec<ContainerSnapshot>,
    images: Vec<ResourceSummary>,
    calls: Calls,
    next_id: usize,
    pending: Option<PendingTransition>,
    fail_run: Option<String>,
    fail_expire: bool,
    /// Container and image IDs whose removal fails
    fail_remove: HashSet<String>,
    /// Repairs leave the container in this state instead of running
    repair_result: Option<StateSnapshot>,
}

/// A daemon that keeps containers in memory and records every call.
#[derive(Default)]
pub struct FakeDaemon {
    inner: Mutex<Inner>,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a labeled container as if an earlier run created it from `request`.
    pub fn seed(&self, request: &RunRequest, state: StateSnapshot) -> String {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = inner.snapshot_for(request, state);
        let id = snapshot.id.clone();
        inner.containers.push(snapshot);
        id
    }

    /// Seed an arbitrary container snapshot.
    pub fn seed_snapshot(&self, snapshot: ContainerSnapshot) {
        self.inner.lock().unwrap().containers.push(snapshot);
    }

    pub fn seed_image(&self, id: &str, labels: &[(&str, &str)]) {
        self.inner.lock().unwrap().images.push(ResourceSummary {
            id: id.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
    }

    /// After `lookups` more name lookups, container `name` switches to `state`.
    pub fn transition_after(&self, name: &str, lookups: usize, state: StateSnapshot) {
        self.inner.lock().unwrap().pending = Some(PendingTransition {
            name: name.to_string(),
            lookups_left: lookups,
            state,
        });
    }

    /// Unpause/start leave the container in `state`.
    pub fn repair_leaves(&self, state: StateSnapshot) {
        self.inner.lock().unwrap().repair_result = Some(state);
    }

    /// Every create fails with `message`, unless the name is taken.
    pub fn fail_run(&self, message: &str) {
        self.inner.lock().unwrap().fail_run = Some(message.to_string());
    }

    pub fn fail_expire(&self) {
        self.inner.lock().unwrap().fail_expire = true;
    }

    /// Removing the container or image `id` fails and leaves it in place.
    pub fn fail_remove(&self, id: &str) {
        self.inner.lock().unwrap().fail_remove.insert(id.to_string());
    }

    pub fn calls(&self) -> Calls {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn container(&self, name: &str) -> Option<ContainerSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn image_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .images
            .iter()
            .map(|i| i.id.clone())
            .collect()
    }
}

impl Inner {
    fn snapshot_for(&mut self, request: &RunRequest, state: StateSnapshot) -> ContainerSnapshot {
        self.next_id += 1;
        let id = format!("c{:04}", self.next_id);
        let name = request.name.clone().unwrap_or_else(|| format!("auto_{}", id));

        let published_ports = request
            .port_bindings
            .iter()
            .flat_map(|(port, bindings)| {
                let private_port = port
                    .split('/')
                    .next()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or_default();
                bindings.iter().map(move |b| PublishedPort {
                    private_port,
                    protocol: "tcp".to_string(),
                    host_ip: b.host_ip.clone(),
                    public_port: b.host_port.parse().unwrap_or_default(),
                })
            })
            .collect();

        ContainerSnapshot {
            id,
            name,
            image: request.image(),
            state,
            labels: request.labels.clone(),
            exposed_ports: request.exposed_ports.iter().cloned().collect::<BTreeSet<_>>(),
            port_bindings: request.port_bindings.clone(),
            published_ports,
            ip_address: Some(format!("172.17.0.{}", self.next_id + 1)),
        }
    }

    fn by_id(&mut self, id: &str) -> Result<&mut ContainerSnapshot> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))
    }

    fn repaired(&self) -> StateSnapshot {
        self.repair_result.clone().unwrap_or_else(running)
    }
}

fn matches(labels: &HashMap<String, String>, filters: &ListFilters) -> bool {
    filters.get("label").into_iter().flatten().all(|filter| {
        match filter.split_once('=') {
            Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
            None => labels.contains_key(filter.as_str()),
        }
    })
}

#[async_trait]
impl ContainerApi for FakeDaemon {
    async fn run_container(&self, request: &RunRequest) -> Result<ContainerSnapshot> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.run += 1;

        if let Some(name) = &request.name {
            if inner.containers.iter().any(|c| &c.name == name) {
                return Err(ContainerError::AlreadyExists(name.clone()));
            }
        }

        if let Some(message) = &inner.fail_run {
            return Err(ContainerError::Other(message.clone()));
        }

        let snapshot = inner.snapshot_for(request, running());
        inner.containers.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot> {
        let mut inner = self.inner.lock().unwrap();
        inner.by_id(id).map(|c| c.clone())
    }

    async fn container_by_name(&self, name: &str) -> Result<Option<ContainerSnapshot>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.lookup += 1;

        let due = match inner.pending.as_mut() {
            Some(pending) if pending.name == name => {
                if pending.lookups_left == 0 {
                    true
                } else {
                    pending.lookups_left -= 1;
                    false
                }
            }
            _ => false,
        };

        if due {
            if let Some(pending) = inner.pending.take() {
                if let Some(container) = inner.containers.iter_mut().find(|c| c.name == name) {
                    container.state = pending.state;
                }
            }
        }

        Ok(inner.containers.iter().find(|c| c.name == name).cloned())
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.unpause += 1;
        let state = inner.repaired();
        inner.by_id(id)?.state = state;
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.start += 1;
        let state = inner.repaired();
        inner.by_id(id)?.state = state;
        Ok(())
    }

    async fn remove_container_by_name(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.remove_by_name += 1;
        inner.containers.retain(|c| c.name != name);
        Ok(())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.remove += 1;
        if inner.fail_remove.contains(id) {
            return Err(ContainerError::Other(format!("container {} is busy", id)));
        }
        let before = inner.containers.len();
        inner.containers.retain(|c| c.id != id);
        if inner.containers.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn expire_container(&self, id: &str, _after: Duration) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.expire += 1;
        if inner.fail_expire {
            return Err(ContainerError::Other("expiry rejected".to_string()));
        }
        inner.by_id(id).map(|_| ())
    }

    async fn list_containers(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .iter()
            .filter(|c| matches(&c.labels, filters))
            .map(|c| ResourceSummary {
                id: c.id.clone(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn list_images(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .images
            .iter()
            .filter(|i| matches(&i.labels, filters))
            .cloned()
            .collect())
    }

    async fn remove_image(&self, id: &str, _force: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.remove_image += 1;
        if inner.fail_remove.contains(id) {
            return Err(ContainerError::Other(format!("image {} is in use", id)));
        }
        let before = inner.images.len();
        inner.images.retain(|i| i.id != id);
        if inner.images.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
