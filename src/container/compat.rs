//! Configuration compatibility checks for container reuse.

use crate::container::{ContainerError, ContainerSnapshot, Result, RunRequest};
use std::sync::Arc;

/// Predicate deciding whether an existing container can serve a request.
///
/// Any error it returns is reported as [`ContainerError::ReuseConflict`].
pub type ConfigCheck = Arc<dyn Fn(&ContainerSnapshot, &RunRequest) -> Result<()> + Send + Sync>;

/// The check every reuse policy starts with: [`check_image_and_ports`].
pub fn default_config_check() -> ConfigCheck {
    Arc::new(check_image_and_ports)
}

/// Compare image, exposed ports and port bindings, stopping at the first mismatch.
///
/// The existing container may expose more ports and carry more bindings than the request
/// asks for. Environment and command are not compared.
pub fn check_image_and_ports(existing: &ContainerSnapshot, candidate: &RunRequest) -> Result<()> {
    let image = candidate.image();
    if existing.image != image {
        return Err(ContainerError::ReuseConflict(format!(
            "image `{}` differs from requested `{}`",
            existing.image, image
        )));
    }

    if let Some(port) = candidate
        .exposed_ports
        .iter()
        .find(|port| !existing.exposed_ports.contains(*port))
    {
        return Err(ContainerError::ReuseConflict(format!(
            "port {} is not exposed",
            port
        )));
    }

    for (port, bindings) in &candidate.port_bindings {
        let existing_bindings = existing
            .port_bindings
            .get(port)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Some(missing) = bindings.iter().find(|b| !existing_bindings.contains(*b)) {
            return Err(ContainerError::ReuseConflict(format!(
                "port {} is not bound to {}:{}",
                port, missing.host_ip, missing.host_port
            )));
        }
    }

    Ok(())
}

/// Run `checks` in order on one snapshot.
pub(crate) fn run_checks(
    checks: &[ConfigCheck],
    existing: &ContainerSnapshot,
    candidate: &RunRequest,
) -> Result<()> {
    for check in checks {
        check(existing, candidate).map_err(|err| match err {
            ContainerError::ReuseConflict(_) => err,
            other => ContainerError::ReuseConflict(other.to_string()),
        })?;
    }
    Ok(())
}
