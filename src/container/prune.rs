//! Label-scoped cleanup.
//!
//! Only resources carrying the ownership label are removed. The label is part of the list
//! filter and is checked again on every listed resource, so a resource created without it
//! while the sweep runs is never touched.

use crate::container::{
    ContainerApi, ContainerError, ErrorKind, ListFilters, ResourceSummary, Result,
};
use crate::env::OWNERSHIP_LABEL;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, warn};

/// Extra filters for a prune sweep, ANDed with the ownership label.
#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    pub container_filters: ListFilters,
    pub image_filters: ListFilters,
}

impl PruneOptions {
    /// Only remove containers matching `key=value` (Docker filter syntax).
    pub fn container_filter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.container_filters
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Only remove images matching `key=value` (Docker filter syntax).
    pub fn image_filter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.image_filters
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// What a prune sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub removed_containers: Vec<String>,
    pub removed_images: Vec<String>,
}

/// Sweep containers and images concurrently.
///
/// A failure in one sweep does not stop the other. On failure the returned
/// [`ContainerError::Prune`] still carries what was removed.
pub(crate) async fn prune(api: &dyn ContainerApi, options: &PruneOptions) -> Result<PruneReport> {
    let container_filters = owned_filters(&options.container_filters);
    let image_filters = owned_filters(&options.image_filters);

    let (containers, images) = futures::join!(
        sweep(
            "container",
            api.list_containers(&container_filters),
            move |id| async move { api.remove_container(&id, true).await },
        ),
        sweep(
            "image",
            api.list_images(&image_filters),
            move |id| async move { api.remove_image(&id, true).await },
        ),
    );

    let (removed_containers, container_failure) = containers;
    let (removed_images, image_failure) = images;
    let removed = PruneReport {
        removed_containers,
        removed_images,
    };

    let failure = match (container_failure, image_failure) {
        (Some(containers), Some(images)) => Some(containers.join(images)),
        (containers, images) => containers.or(images),
    };

    match failure {
        None => {
            info!(
                "Pruned {} containers and {} images",
                removed.removed_containers.len(),
                removed.removed_images.len()
            );
            Ok(removed)
        }
        Some(e) => {
            warn!(
                "Prune failed after removing containers {:?} and images {:?}",
                removed.removed_containers, removed.removed_images
            );
            Err(ContainerError::Prune {
                removed,
                source: Box::new(e),
            })
        }
    }
}

fn owned_filters(extra: &ListFilters) -> ListFilters {
    let mut filters = extra.clone();
    let ownership = format!("{}={}", OWNERSHIP_LABEL, OWNERSHIP_LABEL);
    let labels = filters.entry("label".to_string()).or_default();
    if !labels.contains(&ownership) {
        labels.push(ownership);
    }
    filters
}

fn owned_ids(kind: &str, listed: Vec<ResourceSummary>) -> Vec<String> {
    listed
        .into_iter()
        .filter_map(|resource| {
            if resource.has_label(OWNERSHIP_LABEL, OWNERSHIP_LABEL) {
                Some(resource.id)
            } else {
                warn!("Skipping unlabeled {} {}", kind, resource.id);
                None
            }
        })
        .collect()
}

/// List, re-check the label, remove every match concurrently and collect all failures.
///
/// Returns the removed IDs alongside the failures, if any.
async fn sweep<L, R, F>(kind: &str, list: L, remove: R) -> (Vec<String>, Option<ContainerError>)
where
    L: Future<Output = Result<Vec<ResourceSummary>>>,
    R: Fn(String) -> F,
    F: Future<Output = Result<()>>,
{
    let listed = match list.await {
        Ok(listed) => listed,
        Err(e) => return (Vec::new(), Some(e.context(format!("failed to list {}s", kind)))),
    };
    let ids = owned_ids(kind, listed);
    debug!("Removing {} {}s", ids.len(), kind);

    let results = join_all(ids.iter().cloned().map(&remove)).await;

    let mut removed = Vec::new();
    let mut failure: Option<ContainerError> = None;

    for (id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(()) => removed.push(id),
            Err(e) if e.is(ErrorKind::NotFound) => {
                debug!("{} {} already gone", kind, id);
            }
            Err(e) => {
                let e = e.context(format!("failed to remove {} {}", kind, id));
                failure = Some(match failure {
                    Some(previous) => previous.join(e),
                    None => e,
                });
            }
        }
    }

    (removed, failure)
}
