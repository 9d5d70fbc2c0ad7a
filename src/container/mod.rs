//! Test container orchestration.
//!
//! This module runs short-lived containers for test suites and reconciles them with
//! containers that already exist under the same name. The daemon is reached through the
//! [`ContainerApi`] trait; [`ContainerClient`] implements it over the bollard Docker API.
//!
//! ## Architecture
//!
//! - [`api`]: daemon seam and the owned snapshot types the core works with
//! - [`client`]: bollard-backed [`ContainerApi`] with connection handling and image pulls
//! - [`config`]: [`RunRequest`] built from ordered option mutators
//! - [`backoff`]: bounded exponential retry with permanent/transient errors and cancellation
//! - [`state`]: lifecycle state classification
//! - [`compat`]: configuration compatibility checks between an existing container and a request
//! - [`reuse`]: reuse/repair state machine used on name collisions
//! - [`orchestrator`]: create-or-reuse, expiry and readiness probing
//! - [`expiry`]: timer thread that stops expired containers
//! - [`prune`]: label-scoped cleanup of containers and images
//! - [`handle`]: the handle returned to callers and its endpoints
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tcontainer::container::{ContainerOrchestrator, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = ContainerOrchestrator::new().await?;
//!
//!     let request = RunRequest::builder("redis")
//!         .tag("7-alpine")
//!         .name("my-suite-redis")
//!         .exposed_ports([6379])
//!         .reuse(true, true)
//!         .build()?;
//!
//!     let container = orchestrator.run(&request, &CancellationToken::new()).await?;
//!     println!("redis at {:?}", container.published_endpoint(6379));
//!
//!     orchestrator.purge(&container).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backoff;
mod client;
pub mod compat;
mod config;
mod expiry;
mod handle;
mod orchestrator;
mod prune;
mod reuse;
pub mod state;

pub use api::{
    ContainerApi, ContainerSnapshot, ListFilters, PortBinding, PublishedPort, ResourceSummary,
    StateSnapshot,
};
pub use backoff::{ExponentialBackoff, RetryError, retry};
pub use client::{ContainerClient, ContainerClientConfig};
pub use compat::{ConfigCheck, default_config_check};
pub use config::{
    ReadinessProbe, ReuseOptions, RetryOptions, RunOption, RunRequest, RunRequestBuilder, options,
};
pub use handle::{ApiEndpoint, ContainerHandle};
pub use orchestrator::ContainerOrchestrator;
pub use prune::{PruneOptions, PruneReport};
pub use state::{LifecycleState, Recovery, StateVerdict, classify};

/// Error categories callers match on.
///
/// Use [`ContainerError::is`] rather than comparing messages: it also looks through
/// added context, joined errors and the errors carried by retry timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A container with the requested name already exists
    AlreadyExists,
    /// A retry loop used up its time budget
    RetryTimeout,
    /// The existing container can never become ready
    UnreusableState,
    /// The existing container was created with different options
    ReuseConflict,
    /// An option was given an invalid value
    InvalidOption,
    /// Two options cannot be combined
    OptionConflict,
    /// The caller cancelled the operation
    Cancelled,
    /// Container or image not found
    NotFound,
    /// The container is not ready yet
    NotReady,
    /// The daemon reported a state this crate does not model
    UnexpectedState,
    /// The readiness probe failed
    Probe,
    /// Daemon API error
    Api,
    /// Configuration file error
    Config,
    /// IO error
    Io,
    /// Anything else
    Other,
}

/// Container orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Name collision on create
    #[error("container `{0}` already exists")]
    AlreadyExists(String),

    /// Container not found
    #[error("container not found: {0}")]
    NotFound(String),

    /// Container is still transitioning
    #[error("container is still {0}")]
    NotReady(LifecycleState),

    /// Daemon state outside the modeled set
    #[error("unexpected container state `{0}`")]
    UnexpectedState(String),

    /// Container state rules out reuse
    #[error("impossible to reuse container in its current state: {0}")]
    UnreusableState(LifecycleState),

    /// Existing container differs from the request
    #[error("impossible to reuse container, it has different options: {0}")]
    ReuseConflict(String),

    /// Invalid option value
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Incompatible options
    #[error("conflicted options: {0}")]
    OptionConflict(String),

    /// Retry budget exhausted
    #[error("retry timed out after {attempts} attempts: {last}{}", previous_suffix(.previous))]
    RetryTimeout {
        /// Number of attempts made
        attempts: u32,
        /// Error returned by the final attempt
        last: Box<ContainerError>,
        /// Error returned by the attempt before it, when it differs
        previous: Option<Box<ContainerError>>,
    },

    /// Operation cancelled by the caller
    #[error("operation cancelled{}", last_suffix(.last))]
    Cancelled {
        /// Error of the last completed attempt, if any
        last: Option<Box<ContainerError>>,
    },

    /// Readiness probe error
    #[error("readiness probe failed: {0}")]
    Probe(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error annotated with the phase that produced it
    #[error("{context}: {source}")]
    Context {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: Box<ContainerError>,
    },

    /// Several independent failures
    #[error("{}", join_messages(.0))]
    Joined(Vec<ContainerError>),

    /// Prune sweep that failed after removing some resources
    #[error(
        "prune removed {} containers and {} images, then failed: {source}",
        .removed.removed_containers.len(),
        .removed.removed_images.len()
    )]
    Prune {
        /// What was removed before the failure
        removed: PruneReport,
        /// Every listing or removal failure
        #[source]
        source: Box<ContainerError>,
    },

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

fn previous_suffix(previous: &Option<Box<ContainerError>>) -> String {
    previous
        .as_ref()
        .map(|e| format!("; previous error: {}", e))
        .unwrap_or_default()
}

fn last_suffix(last: &Option<Box<ContainerError>>) -> String {
    last.as_ref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}

fn join_messages(errors: &[ContainerError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ContainerError {
    /// Wrap an arbitrary readiness probe failure.
    pub fn probe<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        ContainerError::Probe(err.into())
    }

    /// Annotate the error with the phase that failed.
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        ContainerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Join two errors, flattening nested joins.
    pub fn join(self, other: ContainerError) -> Self {
        let mut errors = match self {
            ContainerError::Joined(errors) => errors,
            e => vec![e],
        };
        match other {
            ContainerError::Joined(more) => errors.extend(more),
            e => errors.push(e),
        }
        ContainerError::Joined(errors)
    }

    /// Category of this error itself, without looking at wrapped errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContainerError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            ContainerError::NotFound(_) => ErrorKind::NotFound,
            ContainerError::NotReady(_) => ErrorKind::NotReady,
            ContainerError::UnexpectedState(_) => ErrorKind::UnexpectedState,
            ContainerError::UnreusableState(_) => ErrorKind::UnreusableState,
            ContainerError::ReuseConflict(_) => ErrorKind::ReuseConflict,
            ContainerError::InvalidOption(_) => ErrorKind::InvalidOption,
            ContainerError::OptionConflict(_) => ErrorKind::OptionConflict,
            ContainerError::RetryTimeout { .. } => ErrorKind::RetryTimeout,
            ContainerError::Cancelled { .. } => ErrorKind::Cancelled,
            ContainerError::Probe(_) => ErrorKind::Probe,
            ContainerError::ApiError(_) => ErrorKind::Api,
            ContainerError::ConfigError(_) => ErrorKind::Config,
            ContainerError::IoError(_) => ErrorKind::Io,
            ContainerError::Context { source, .. } | ContainerError::Prune { source, .. } => {
                source.kind()
            }
            ContainerError::Joined(_) | ContainerError::Other(_) => ErrorKind::Other,
        }
    }

    /// Resources a failed prune removed anyway, looking through added context.
    pub fn pruned(&self) -> Option<&PruneReport> {
        match self {
            ContainerError::Prune { removed, .. } => Some(removed),
            ContainerError::Context { source, .. } => source.pruned(),
            _ => None,
        }
    }

    /// Whether this error, or any error it wraps, is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        if self.kind() == kind {
            return true;
        }

        match self {
            ContainerError::Context { source, .. } | ContainerError::Prune { source, .. } => {
                source.is(kind)
            }
            ContainerError::Joined(errors) => errors.iter().any(|e| e.is(kind)),
            ContainerError::RetryTimeout { last, previous, .. } => {
                last.is(kind) || previous.as_ref().is_some_and(|e| e.is(kind))
            }
            ContainerError::Cancelled { last } => last.as_ref().is_some_and(|e| e.is(kind)),
            _ => false,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let err = ContainerError::AlreadyExists("db".to_string()).context("failed to create");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(err.is(ErrorKind::AlreadyExists));
        assert_eq!(
            err.to_string(),
            "failed to create: container `db` already exists"
        );
    }

    #[test]
    fn test_joined_matches_every_member() {
        let err = ContainerError::ReuseConflict("other image".to_string())
            .context("failed to reuse")
            .join(ContainerError::Other("daemon down".to_string()));

        assert!(err.is(ErrorKind::ReuseConflict));
        assert!(err.is(ErrorKind::Other));
        assert!(!err.is(ErrorKind::AlreadyExists));
        assert!(err.to_string().contains("; "));
    }

    #[test]
    fn test_join_flattens() {
        let err = ContainerError::Other("a".to_string())
            .join(ContainerError::Other("b".to_string()))
            .join(ContainerError::Other("c".to_string()));

        match err {
            ContainerError::Joined(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected joined error, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_timeout_matches_last_and_previous() {
        let err = ContainerError::RetryTimeout {
            attempts: 3,
            last: Box::new(ContainerError::NotReady(LifecycleState::Paused)),
            previous: Some(Box::new(ContainerError::UnexpectedState(
                "created".to_string(),
            ))),
        };

        assert!(err.is(ErrorKind::RetryTimeout));
        assert!(err.is(ErrorKind::NotReady));
        assert!(err.is(ErrorKind::UnexpectedState));
        assert!(err.to_string().contains("previous error"));
    }

    #[test]
    fn test_cancelled_is_not_timeout() {
        let err = ContainerError::Cancelled {
            last: Some(Box::new(ContainerError::probe("connection refused"))),
        };

        assert!(err.is(ErrorKind::Cancelled));
        assert!(err.is(ErrorKind::Probe));
        assert!(!err.is(ErrorKind::RetryTimeout));
    }

    #[test]
    fn test_prune_error_keeps_report_and_kind() {
        let removed = PruneReport {
            removed_containers: vec!["c1".to_string()],
            removed_images: Vec::new(),
        };
        let err = ContainerError::Prune {
            removed: removed.clone(),
            source: Box::new(ContainerError::NotFound("img".to_string())),
        }
        .context("cleanup");

        assert!(err.is(ErrorKind::NotFound));
        assert_eq!(err.pruned(), Some(&removed));
        assert!(err.to_string().contains("prune removed 1 containers and 0 images"));
        assert_eq!(ContainerError::Other("x".to_string()).pruned(), None);
    }
}
