//! Reuse and repair of a container that already holds the requested name.
//!
//! The first attempt inspects the container once, rules out unusable states and
//! incompatible configuration, and nudges a paused or exited container with exactly one
//! unpause/start call. Later attempts only poll under the reuse backoff; calling
//! unpause/start again while the daemon is mid-transition would race with it.

use crate::container::backoff::{RetryError, retry};
use crate::container::compat::run_checks;
use crate::container::state::{Recovery, StateVerdict, classify};
use crate::container::{
    ContainerApi, ContainerError, ContainerHandle, ContainerSnapshot, ErrorKind, Result,
    RunRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct Reuser<'a> {
    api: &'a dyn ContainerApi,
    request: &'a RunRequest,
    name: &'a str,
}

impl<'a> Reuser<'a> {
    pub(crate) fn new(api: &'a dyn ContainerApi, request: &'a RunRequest, name: &'a str) -> Self {
        Self { api, request, name }
    }

    /// Reuse the existing container, falling back to recreation when the request allows it.
    pub(crate) async fn reuse_or_recreate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle> {
        let err = match self.reuse(cancel).await {
            Ok(handle) => return Ok(handle),
            Err(err) => err.context("failed to reuse container"),
        };

        if !self.request.reuse.recreate_on_err || err.is(ErrorKind::Cancelled) {
            return Err(err);
        }

        warn!(
            "Could not reuse container {}, recreating it: {}",
            self.name, err
        );

        match self.recreate().await {
            Ok(handle) => Ok(handle),
            Err(recreate_err) => {
                Err(err.join(recreate_err.context("failed to recreate container after reuse error")))
            }
        }
    }

    /// Wait for the existing container to become usable.
    pub(crate) async fn reuse(&self, cancel: &CancellationToken) -> Result<ContainerHandle> {
        let (snapshot, verdict) = self.evaluate().await.map_err(RetryError::into_inner)?;

        match verdict {
            StateVerdict::Ready => {
                info!("Reusing running container: {} ({})", self.name, snapshot.id);
                return Ok(snapshot.into());
            }
            StateVerdict::Recovering(recovery) => self.repair(&snapshot, recovery).await?,
            StateVerdict::Unexpected(status) => {
                return Err(ContainerError::UnexpectedState(status));
            }
            StateVerdict::Unusable(state) => return Err(ContainerError::UnreusableState(state)),
        }

        let handle = retry(&self.request.reuse.backoff, cancel, || self.attempt()).await?;
        info!("Reusing repaired container: {} ({})", self.name, handle.id);
        Ok(handle)
    }

    /// Remove whatever holds the name and create a fresh container.
    pub(crate) async fn recreate(&self) -> Result<ContainerHandle> {
        info!("Recreating container: {}", self.name);

        self.api
            .remove_container_by_name(self.name)
            .await
            .map_err(|e| e.context(format!("failed to remove container `{}`", self.name)))?;

        let snapshot = self
            .api
            .run_container(self.request)
            .await
            .map_err(|e| e.context("failed to create container"))?;

        info!("Created container: {} ({})", snapshot.name, snapshot.id);
        Ok(snapshot.into())
    }

    /// One poll of the retry loop.
    async fn attempt(&self) -> std::result::Result<ContainerHandle, RetryError> {
        let (snapshot, verdict) = self.evaluate().await?;

        match verdict {
            StateVerdict::Ready => Ok(snapshot.into()),
            StateVerdict::Recovering(_) => Err(RetryError::Transient(ContainerError::NotReady(
                snapshot.lifecycle(),
            ))),
            StateVerdict::Unexpected(status) => {
                warn!(
                    "Container {} reports unexpected state `{}`",
                    self.name, status
                );
                Err(RetryError::Transient(ContainerError::UnexpectedState(
                    status,
                )))
            }
            StateVerdict::Unusable(state) => Err(RetryError::Permanent(
                ContainerError::UnreusableState(state),
            )),
        }
    }

    /// Look up the container, classify it and check its configuration, all from a single
    /// inspection.
    async fn evaluate(&self) -> std::result::Result<(ContainerSnapshot, StateVerdict), RetryError> {
        let snapshot = self
            .api
            .container_by_name(self.name)
            .await
            .map_err(|e| {
                RetryError::Transient(e.context(format!("failed to look up `{}`", self.name)))
            })?
            .ok_or_else(|| RetryError::Permanent(ContainerError::NotFound(self.name.to_string())))?;

        let state = snapshot.lifecycle();
        let verdict = classify(&state);
        debug!("Container {} is {}: {:?}", self.name, state, verdict);

        if verdict.is_permanent() {
            return Err(RetryError::Permanent(ContainerError::UnreusableState(state)));
        }

        run_checks(&self.request.reuse.config_checks, &snapshot, self.request)
            .map_err(RetryError::Permanent)?;

        Ok((snapshot, verdict))
    }

    async fn repair(&self, snapshot: &ContainerSnapshot, recovery: Recovery) -> Result<()> {
        match recovery {
            Recovery::Unpause => {
                info!("Unpausing container: {} ({})", self.name, snapshot.id);
                self.api
                    .unpause_container(&snapshot.id)
                    .await
                    .map_err(|e| e.context("failed to unpause container"))
            }
            Recovery::Start => {
                info!("Starting exited container: {} ({})", self.name, snapshot.id);
                self.api
                    .start_container(&snapshot.id)
                    .await
                    .map_err(|e| e.context("failed to start container"))
            }
            Recovery::Wait => {
                debug!("Container {} is restarting, waiting", self.name);
                Ok(())
            }
        }
    }
}
