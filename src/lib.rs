//! # tcontainer
//!
//! Short-lived containers for test suites: databases, mock servers and anything else a
//! test needs running next to it.
//!
//! The central piece is the reuse protocol. When a test asks for a container under a name
//! that is already taken, tcontainer decides whether the existing container can be used
//! as is, repaired (unpaused or started), recreated, or must be reported as a conflict.
//! Waiting is bounded by exponential backoff and every error can be matched by kind.
//!
//! - **[`container`]**: run requests, the reuse state machine, readiness probing and
//!   label-scoped pruning over the Docker API
//! - **[`cli`]**: the `tcontainer` command line front end and configuration discovery
//! - **[`env`]**: ownership label, defaults and configuration file locations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tcontainer::container::{ContainerError, ContainerOrchestrator, RetryError, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let orchestrator = ContainerOrchestrator::new().await?;
//!
//!     let request = RunRequest::builder("postgres")
//!         .tag("16-alpine")
//!         .name("suite-postgres")
//!         .env("POSTGRES_PASSWORD", "postgres")
//!         .exposed_ports([5432])
//!         .reuse(true, true)
//!         .readiness_probe(|container| async move {
//!             let endpoint = container
//!                 .published_endpoint(5432)
//!                 .ok_or_else(|| RetryError::permanent(ContainerError::probe("not published")))?;
//!             tokio::net::TcpStream::connect(endpoint.host_port())
//!                 .await
//!                 .map(|_| ())
//!                 .map_err(RetryError::transient)
//!         })
//!         .build()?;
//!
//!     let container = orchestrator.run(&request, &CancellationToken::new()).await?;
//!     println!("postgres listening on {:?}", container.published_endpoint(5432));
//!     Ok(())
//! }
//! ```

/// Container orchestration over the Docker/Podman API.
///
/// Run requests, reuse and repair of existing containers, readiness probing and
/// label-scoped cleanup.
pub mod container;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

pub use container::{
    ContainerError, ContainerHandle, ContainerOrchestrator, ErrorKind, PruneOptions, RunRequest,
};
