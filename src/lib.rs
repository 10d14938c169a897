//! dbcluster-operator library crate
//!
//! Rolling upgrade core for multi-role database clusters. Exports the CRD
//! types, the per-role upgraders, upgrade metrics, and the reflector-backed
//! pod cache the upgraders read from.

pub mod controller;
pub mod crd;
pub mod metrics;
pub mod resources;

pub use controller::{
    Error, FakeUpgrader, PodLister, Result, RoleUpgrader, StorePodLister, UpgradeContext,
    UpgradeOutcome, Upgrader,
};
pub use metrics::UpgradeMetrics;

use std::future::Future;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::{WatchStreamExt, reflector, watcher};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

/// Create namespaced or cluster-wide API based on scope
pub fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Create the default watcher configuration.
///
/// - `any_semantic()`: More reliable resource discovery in test environments
fn default_watcher_config() -> WatcherConfig {
    WatcherConfig::default().any_semantic()
}

/// Build the pod cache the upgraders read from.
///
/// Watches pods carrying the operator's labels, namespaced or cluster-wide.
/// Returns the lister and the future that keeps it filled; the caller spawns
/// the future and should wait for the store to be ready before upgrading.
pub fn pod_cache(
    client: Client,
    namespace: Option<&str>,
) -> (StorePodLister, impl Future<Output = ()> + Send + 'static) {
    info!(
        scope = namespace.unwrap_or("cluster-wide"),
        "Starting pod cache"
    );
    let pods: Api<Pod> = scoped_api(client, namespace);
    let config = default_watcher_config().labels(&resources::pod_selector(None));
    drive_pod_cache(watcher(pods, config))
}

/// Reflect a pod watch stream into a store.
///
/// Watch errors are retried with the default backoff and logged; the
/// returned future ends only when the stream does.
fn drive_pod_cache<S>(events: S) -> (StorePodLister, impl Future<Output = ()> + Send + 'static)
where
    S: Stream<Item = std::result::Result<watcher::Event<Pod>, watcher::Error>> + Send + 'static,
{
    let (reader, writer) = reflector::store();
    let driver = reflector(writer, events)
        .default_backoff()
        .applied_objects()
        .for_each(|result| async move {
            if let Err(e) = result {
                warn!(error = %e, "Pod watch error");
            }
        });
    (StorePodLister::new(reader), driver)
}
