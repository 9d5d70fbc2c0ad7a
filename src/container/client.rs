//! Docker/Podman client wrapper.
//!
//! Implements [`ContainerApi`] over the bollard Docker API with automatic connection
//! fallbacks, on-demand image pulls and conversion of daemon responses into owned
//! snapshots.

use crate::container::expiry::ExpiryTimers;
use crate::container::{
    ContainerApi, ContainerError, ContainerSnapshot, ListFilters, PortBinding, PublishedPort,
    ResourceSummary, Result, RunRequest, StateSnapshot,
};
use crate::env::defaults;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerInspectResponse, HostConfig, RestartPolicy, RestartPolicyNameEnum,
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Container client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerClientConfig {
    /// Daemon socket, e.g. `unix:///var/run/docker.sock`; local defaults when unset
    pub docker_host: Option<String>,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for ContainerClientConfig {
    fn default() -> Self {
        Self {
            docker_host: None,
            timeout: 120,
        }
    }
}

/// Docker/Podman API client wrapper.
///
/// Owns a background thread for container expiry timers. The thread keeps its own
/// connection and lets pending timers fire even after the client is dropped.
#[derive(Clone)]
pub struct ContainerClient {
    docker: Arc<Docker>,
    expiry: ExpiryTimers,
}

impl ContainerClient {
    /// Connect with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman are available or connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(ContainerClientConfig::default()).await
    }

    /// Connect with custom configuration and verify the daemon answers.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn with_config(config: ContainerClientConfig) -> Result<Self> {
        let docker = Self::connect(&config)?;

        let timer_config = config.clone();
        let expiry = ExpiryTimers::start(
            move || Self::connect(&timer_config).map(Arc::new),
            |docker: Arc<Docker>, id| async move { stop_expired(&docker, &id).await },
        )?;

        let client = Self {
            docker: Arc::new(docker),
            expiry,
        };

        client.ping().await?;

        Ok(client)
    }

    /// Connect to Docker or Podman daemon.
    ///
    /// Tries, in order:
    /// 1. The configured socket
    /// 2. Local defaults (Unix socket or Windows named pipe)
    /// 3. Rootless and system Podman sockets
    fn connect(config: &ContainerClientConfig) -> Result<Docker> {
        if let Some(host) = &config.docker_host {
            debug!("Connecting to configured container runtime: {}", host);
            return Docker::connect_with_socket(host, config.timeout, bollard::API_DEFAULT_VERSION)
                .map_err(ContainerError::ApiError);
        }

        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(&socket, config.timeout, bollard::API_DEFAULT_VERSION)
                {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman socket {} failed: {}", socket, e);
                    }
                }
            }
        }

        Err(ContainerError::Other(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string()
        ))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Other(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// Get the underlying Docker client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Pull `image` unless it is already present locally.
    ///
    /// # Errors
    ///
    /// Returns error if inspection or the pull fails.
    pub async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => {
                debug!("Image {} already exists locally", image);
                return Ok(());
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(ContainerError::ApiError(e)),
        }

        info!("Pulling image: {}", image);

        let mut stream = self.docker.create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(status) = info.status {
                debug!("Pull: {}", status);
            }
            if let Some(error) = info.error {
                return Err(ContainerError::Other(format!("Pull failed: {}", error)));
            }
        }

        info!("Successfully pulled image: {}", image);
        Ok(())
    }

    async fn create(&self, request: &RunRequest) -> Result<String> {
        use bollard::container::Config as BollardConfig;

        let options = request
            .name
            .as_deref()
            .map(|name| bollard::container::CreateContainerOptions {
                name,
                ..Default::default()
            });

        let exposed_ports: HashMap<String, HashMap<(), ()>> = request
            .exposed_ports
            .iter()
            .chain(request.port_bindings.keys())
            .map(|port| (port.clone(), HashMap::new()))
            .collect();

        let bollard_config = BollardConfig {
            image: Some(request.image()),
            cmd: request.cmd.clone(),
            entrypoint: request.entrypoint.clone(),
            working_dir: request.working_dir.clone(),
            env: (!request.env.is_empty()).then(|| request.env.clone()),
            labels: Some(request.labels.clone()),
            user: request.user.clone(),
            hostname: request.hostname.clone(),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config(request)),
            ..Default::default()
        };

        let display_name = request.name.as_deref().unwrap_or("<generated>");
        debug!("Creating container: {}", display_name);

        let response = self
            .docker
            .create_container(options, bollard_config)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 409, ..
                } => ContainerError::AlreadyExists(display_name.to_string()),
                e => ContainerError::ApiError(e),
            })?;

        for warning in &response.warnings {
            warn!("Daemon warning for {}: {}", display_name, warning);
        }

        Ok(response.id)
    }

    /// IDs of containers named exactly `name`.
    async fn ids_by_name(&self, name: &str) -> Result<Vec<String>> {
        let filters = HashMap::from([(
            "name".to_string(),
            vec![format!("^/{}$", regex::escape(name))],
        )]);

        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let wanted = format!("/{}", name);
        Ok(containers
            .into_iter()
            .filter(|c| c.names.as_ref().is_some_and(|names| names.contains(&wanted)))
            .filter_map(|c| c.id)
            .collect())
    }
}

/// Host configuration sent on create: the request's passthrough plus the managed fields.
fn host_config(request: &RunRequest) -> HostConfig {
    let mut host_config = request.host_config.clone();
    host_config.auto_remove = Some(request.auto_remove);
    host_config.publish_all_ports = Some(true);
    if host_config.restart_policy.is_none() {
        host_config.restart_policy = Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            ..Default::default()
        });
    }

    if !request.port_bindings.is_empty() {
        let port_bindings = host_config.port_bindings.get_or_insert_with(HashMap::new);
        for (port, bindings) in &request.port_bindings {
            port_bindings.insert(
                port.clone(),
                Some(
                    bindings
                        .iter()
                        .map(|b| bollard::models::PortBinding {
                            host_ip: Some(b.host_ip.clone()),
                            host_port: Some(b.host_port.clone()),
                        })
                        .collect(),
                ),
            );
        }
    }

    host_config
}

async fn stop_expired(docker: &Docker, id: &str) {
    let result = docker
        .stop_container(
            id,
            Some(bollard::container::StopContainerOptions {
                t: defaults::STOP_TIMEOUT_SECS,
            }),
        )
        .await;

    match result {
        Ok(()) => info!("Stopped expired container: {}", id),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304 | 404,
            ..
        }) => debug!("Expired container {} already stopped", id),
        Err(e) => warn!("Failed to stop expired container {}: {}", id, e),
    }
}

fn not_found(err: bollard::errors::Error, subject: &str) -> ContainerError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ContainerError::NotFound(subject.to_string()),
        e => ContainerError::ApiError(e),
    }
}

/// Copy what the core needs out of an inspection.
fn snapshot_from_inspect(inspect: ContainerInspectResponse) -> ContainerSnapshot {
    let state = inspect
        .state
        .map(|s| StateSnapshot {
            status: s.status.map(|st| st.to_string()).unwrap_or_default(),
            running: s.running.unwrap_or(false),
            paused: s.paused.unwrap_or(false),
            restarting: s.restarting.unwrap_or(false),
            oom_killed: s.oom_killed.unwrap_or(false),
            dead: s.dead.unwrap_or(false),
        })
        .unwrap_or_default();

    let (image, labels, exposed_ports) = match inspect.config {
        Some(config) => (
            config.image.unwrap_or_default(),
            config.labels.unwrap_or_default(),
            config
                .exposed_ports
                .map(|ports| ports.into_keys().collect())
                .unwrap_or_default(),
        ),
        None => Default::default(),
    };

    let port_bindings = inspect
        .host_config
        .and_then(|hc| hc.port_bindings)
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| (port, convert_bindings(bindings)))
        .collect();

    let (published_ports, ip_address) = match inspect.network_settings {
        Some(settings) => {
            let published = settings
                .ports
                .unwrap_or_default()
                .into_iter()
                .flat_map(|(port, bindings)| published_ports(&port, bindings))
                .collect();
            let ip = settings
                .networks
                .and_then(|mut networks| networks.remove("bridge"))
                .and_then(|endpoint| endpoint.ip_address)
                .filter(|ip| !ip.is_empty());
            (published, ip)
        }
        None => (Vec::new(), None),
    };

    ContainerSnapshot {
        id: inspect.id.unwrap_or_default(),
        name: inspect
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        image,
        state,
        labels,
        exposed_ports,
        port_bindings,
        published_ports,
        ip_address,
    }
}

fn convert_bindings(bindings: Option<Vec<bollard::models::PortBinding>>) -> Vec<PortBinding> {
    bindings
        .unwrap_or_default()
        .into_iter()
        .map(|b| PortBinding {
            host_ip: b.host_ip.unwrap_or_default(),
            host_port: b.host_port.unwrap_or_default(),
        })
        .collect()
}

fn published_ports(
    port: &str,
    bindings: Option<Vec<bollard::models::PortBinding>>,
) -> Vec<PublishedPort> {
    let (private, protocol) = port.split_once('/').unwrap_or((port, "tcp"));
    let Ok(private_port) = private.parse::<u16>() else {
        return Vec::new();
    };

    convert_bindings(bindings)
        .into_iter()
        .filter_map(|b| {
            Some(PublishedPort {
                private_port,
                protocol: protocol.to_string(),
                public_port: b.host_port.parse().ok()?,
                host_ip: b.host_ip,
            })
        })
        .collect()
}

#[async_trait]
impl ContainerApi for ContainerClient {
    async fn run_container(&self, request: &RunRequest) -> Result<ContainerSnapshot> {
        self.ensure_image(&request.image()).await?;

        let id = self.create(request).await?;

        if let Err(e) = self.start_container(&id).await {
            warn!("Failed to start container {}, removing it: {}", id, e);
            if let Err(remove_err) = self.remove_container(&id, true).await {
                warn!("Failed to remove container {}: {}", id, remove_err);
            }
            return Err(e);
        }

        self.inspect_container(&id).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot> {
        let inspect = self
            .docker
            .inspect_container(id, None::<bollard::query_parameters::InspectContainerOptions>)
            .await
            .map_err(|e| not_found(e, id))?;

        Ok(snapshot_from_inspect(inspect))
    }

    async fn container_by_name(&self, name: &str) -> Result<Option<ContainerSnapshot>> {
        let Some(id) = self.ids_by_name(name).await?.into_iter().next() else {
            return Ok(None);
        };

        match self.inspect_container(&id).await {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(ContainerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        debug!("Unpausing container: {}", id);
        self.docker
            .unpause_container(id)
            .await
            .map_err(|e| not_found(e, id))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        debug!("Starting container: {}", id);

        self.docker
            .start_container(id, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .map_err(|e| not_found(e, id))?;

        info!("Started container: {}", id);
        Ok(())
    }

    async fn remove_container_by_name(&self, name: &str) -> Result<()> {
        for id in self.ids_by_name(name).await? {
            match self.remove_container(&id, true).await {
                Ok(()) | Err(ContainerError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        debug!("Removing container: {}", id);

        self.docker
            .remove_container(
                id,
                Some(bollard::container::RemoveContainerOptions {
                    force,
                    v: true, // Remove associated volumes
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| not_found(e, id))?;

        info!("Removed container: {}", id);
        Ok(())
    }

    async fn expire_container(&self, id: &str, after: Duration) -> Result<()> {
        debug!("Container {} expires in {:?}", id, after);
        self.expiry.schedule(id, after)
    }

    async fn list_containers(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>> {
        let containers = self
            .docker
            .list_containers(Some(bollard::container::ListContainersOptions {
                all: true,
                filters: filters.clone(),
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ResourceSummary {
                    id: c.id?,
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn list_images(&self, filters: &ListFilters) -> Result<Vec<ResourceSummary>> {
        let images = self
            .docker
            .list_images(Some(bollard::image::ListImagesOptions::<String> {
                all: true,
                filters: filters.clone(),
                ..Default::default()
            }))
            .await?;

        Ok(images
            .into_iter()
            .map(|img| ResourceSummary {
                id: img.id,
                labels: img.labels,
            })
            .collect())
    }

    async fn remove_image(&self, id: &str, force: bool) -> Result<()> {
        debug!("Removing image: {}", id);

        self.docker
            .remove_image(
                id,
                Some(bollard::image::RemoveImageOptions {
                    force,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(|e| not_found(e, id))?;

        info!("Removed image: {}", id);
        Ok(())
    }
}
