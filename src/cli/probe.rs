//! HTTP readiness probe for `tcontainer run --http-probe`.

use super::args::HttpProbe;
use crate::container::{ContainerError, ContainerHandle, RetryError, RunOption, options};
use tracing::debug;

/// Readiness probe option issuing `GET http://<published endpoint><path>`.
///
/// Any 2xx response means ready. Connection errors and other statuses are retried; a
/// port that is not published at all fails right away.
pub fn http_readiness(probe: HttpProbe, client: reqwest::Client) -> RunOption {
    options::with_readiness_probe(move |handle: ContainerHandle| {
        let client = client.clone();
        let probe = probe.clone();

        async move {
            let endpoint = handle.published_endpoint(probe.port).ok_or_else(|| {
                RetryError::permanent(ContainerError::probe(format!(
                    "port {} of {} is not published",
                    probe.port, handle.name
                )))
            })?;

            let url = format!("http://{}{}", endpoint.host_port(), probe.path);
            debug!("Probing {}", url);

            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| RetryError::transient(ContainerError::probe(e)))?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(RetryError::transient(ContainerError::probe(format!(
                    "GET {} returned {}",
                    url,
                    response.status()
                ))))
            }
        }
    })
}
