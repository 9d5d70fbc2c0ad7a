//! Container run orchestration.
//!
//! Creates a container, or hands a name collision to the reuse state machine, then sets
//! the expiry and waits for the readiness probe. Any failure after the container exists
//! purges it before the error is returned.

use crate::container::backoff::retry;
use crate::container::prune::{self, PruneOptions, PruneReport};
use crate::container::reuse::Reuser;
use crate::container::{
    ContainerApi, ContainerClient, ContainerClientConfig, ContainerHandle, ErrorKind, Result,
    RunOption, RunRequest,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// High-level container orchestrator.
///
/// Cheap to clone; clones share the daemon connection.
#[derive(Clone)]
pub struct ContainerOrchestrator {
    api: Arc<dyn ContainerApi>,
}

impl ContainerOrchestrator {
    /// Create a new orchestrator connected with default client configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn new() -> Result<Self> {
        Self::with_client_config(ContainerClientConfig::default()).await
    }

    /// Create a new orchestrator with custom client configuration.
    ///
    /// # Errors
    ///
    /// Returns error if connection to container runtime fails.
    pub async fn with_client_config(config: ContainerClientConfig) -> Result<Self> {
        let client = ContainerClient::with_config(config).await?;
        Ok(Self::with_api(Arc::new(client)))
    }

    /// Create an orchestrator over any daemon implementation.
    pub fn with_api(api: Arc<dyn ContainerApi>) -> Self {
        Self { api }
    }

    /// Get the underlying daemon API.
    pub fn api(&self) -> &dyn ContainerApi {
        self.api.as_ref()
    }

    /// Apply `options` to a request for `repository` and run it.
    ///
    /// # Errors
    ///
    /// Option errors, then everything [`run`](Self::run) returns.
    pub async fn run_with_options<S, I>(
        &self,
        repository: S,
        options: I,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle>
    where
        S: Into<String>,
        I: IntoIterator<Item = RunOption>,
    {
        let request =
            RunRequest::apply(repository, options).map_err(|e| e.context("invalid run options"))?;
        self.run(&request, cancel).await
    }

    /// Create or reuse a container, set its expiry and wait until it is ready.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::OptionConflict`] when reuse and remove-on-exists are both set
    /// - [`ErrorKind::AlreadyExists`] when the name is taken and neither reuse nor
    ///   remove-on-exists is enabled
    /// - [`ErrorKind::UnreusableState`] / [`ErrorKind::ReuseConflict`] when reuse fails
    /// - [`ErrorKind::RetryTimeout`] when the readiness probe never succeeds
    /// - [`ErrorKind::Cancelled`] when `cancel` fires during a retry loop
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle> {
        request
            .validate()
            .map_err(|e| e.context("invalid run request"))?;

        let handle = self.init_container(request, cancel).await?;

        if let Some(expiry) = request.expiry {
            if let Err(e) = self.api.expire_container(&handle.id, expiry).await {
                self.purge_quietly(&handle).await;
                return Err(e.context("failed to set container expiry"));
            }
        }

        if let Some(probe) = &request.retry.probe {
            debug!("Waiting for container {} to become ready", handle.name);

            if let Err(e) = retry(&request.retry.backoff, cancel, || probe(handle.clone())).await {
                self.purge_quietly(&handle).await;
                return Err(e.context("readiness probe failed"));
            }

            info!("Container ready: {} ({})", handle.name, handle.id);
        }

        Ok(handle)
    }

    async fn init_container(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle> {
        let err = match self.api.run_container(request).await {
            Ok(snapshot) => {
                info!("Created container: {} ({})", snapshot.name, snapshot.id);
                return Ok(snapshot.into());
            }
            Err(e) => e,
        };

        let name = match request.name.as_deref() {
            Some(name) if err.is(ErrorKind::AlreadyExists) => name,
            _ => return Err(err.context("failed to create container")),
        };

        let reuser = Reuser::new(self.api.as_ref(), request, name);

        if request.reuse.enabled {
            debug!("Container {} already exists, trying to reuse it", name);
            reuser.reuse_or_recreate(cancel).await
        } else if request.remove_on_exists {
            debug!("Container {} already exists, removing it", name);
            reuser
                .recreate()
                .await
                .map_err(|e| e.context("failed to recreate existing container"))
        } else {
            Err(err.context("failed to create container"))
        }
    }

    /// Force-remove a container and its anonymous volumes.
    ///
    /// A container the daemon already removed counts as purged.
    ///
    /// # Errors
    ///
    /// Returns error if removal fails.
    pub async fn purge(&self, handle: &ContainerHandle) -> Result<()> {
        match self.api.remove_container(&handle.id, true).await {
            Ok(()) => {
                info!("Purged container: {} ({})", handle.name, handle.id);
                Ok(())
            }
            Err(e) if e.is(ErrorKind::NotFound) => {
                debug!("Container {} already removed", handle.id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn purge_quietly(&self, handle: &ContainerHandle) {
        if let Err(e) = self.purge(handle).await {
            warn!("Failed to purge container {}: {}", handle.id, e);
        }
    }

    /// Force-remove the container named exactly `name`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if lookup or removal fails.
    pub async fn remove_by_name(&self, name: &str) -> Result<()> {
        self.api.remove_container_by_name(name).await
    }

    /// Remove every labeled container and image matching `options`.
    ///
    /// # Errors
    ///
    /// Every listing or removal failure, joined.
    pub async fn prune(&self, options: &PruneOptions) -> Result<PruneReport> {
        prune::prune(self.api.as_ref(), options).await
    }
}
