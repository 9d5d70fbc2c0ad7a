//! Handles to running containers and the endpoints they can be reached at.

use crate::container::{ContainerSnapshot, LifecycleState};
use serde::Serialize;
use std::fmt;

/// Address at which a container port can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiEndpoint {
    pub ip: String,
    pub port: u16,
}

impl ApiEndpoint {
    /// `ip:port`, with IPv6 addresses in brackets.
    pub fn host_port(&self) -> String {
        if self.ip.contains(':') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host_port())
    }
}

/// A created or reused container.
///
/// Holds the inspection taken when the container was handed out; it is not refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    snapshot: ContainerSnapshot,
}

impl From<ContainerSnapshot> for ContainerHandle {
    fn from(snapshot: ContainerSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            name: snapshot.name.clone(),
            snapshot,
        }
    }
}

impl ContainerHandle {
    pub fn snapshot(&self) -> &ContainerSnapshot {
        &self.snapshot
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.snapshot.lifecycle()
    }

    /// Endpoint for `private_port` as seen from the machine running the tests.
    ///
    /// On Linux the bridge network is routable, so this is the container IP and the
    /// private port. Elsewhere (Docker Desktop on macOS) the bridge is hidden inside a VM
    /// and the published port on `127.0.0.1` is used instead.
    pub fn endpoint(&self, private_port: u16) -> Option<ApiEndpoint> {
        if cfg!(target_os = "macos") {
            return self.published_endpoint(private_port);
        }

        let ip = self.snapshot.ip_address.as_deref().filter(|ip| !ip.is_empty())?;
        let exposed = self
            .snapshot
            .exposed_ports
            .contains(&format!("{}/tcp", private_port))
            || self
                .snapshot
                .published_ports
                .iter()
                .any(|p| p.private_port == private_port);

        exposed.then(|| ApiEndpoint {
            ip: ip.to_string(),
            port: private_port,
        })
    }

    /// Host-side endpoint of the port published for `private_port`.
    pub fn published_endpoint(&self, private_port: u16) -> Option<ApiEndpoint> {
        self.snapshot
            .published_ports
            .iter()
            .find(|p| p.private_port == private_port && p.public_port != 0)
            .map(|p| ApiEndpoint {
                ip: match p.host_ip.as_str() {
                    "" | "0.0.0.0" | "::" => "127.0.0.1".to_string(),
                    ip => ip.to_string(),
                },
                port: p.public_port,
            })
    }

    /// [`endpoint`](Self::endpoint) for every exposed or published port.
    pub fn endpoints(&self) -> Vec<(u16, ApiEndpoint)> {
        let mut ports: Vec<u16> = self
            .snapshot
            .exposed_ports
            .iter()
            .filter_map(|p| p.split('/').next()?.parse().ok())
            .chain(self.snapshot.published_ports.iter().map(|p| p.private_port))
            .collect();
        ports.sort_unstable();
        ports.dedup();

        ports
            .into_iter()
            .filter_map(|port| self.endpoint(port).map(|e| (port, e)))
            .collect()
    }
}
