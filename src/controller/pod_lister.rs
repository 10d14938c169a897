//! Read-only pod lookups against a local cache.
//!
//! The upgrade core never talks to the API server directly. It reads pods
//! through [`PodLister`], which in production is backed by a reflector store
//! kept warm by a watch, and in tests by an in-memory map.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{ObjectRef, Store};

use crate::controller::error::LookupError;

/// Cache-backed pod lookup.
pub trait PodLister: Send + Sync {
    /// Get a pod by namespace and name.
    ///
    /// Returns `LookupError::NotFound` when the pod is absent from the cache.
    fn get(&self, namespace: &str, name: &str) -> Result<Pod, LookupError>;
}

/// [`PodLister`] over a kube reflector store.
#[derive(Clone)]
pub struct StorePodLister {
    store: Store<Pod>,
}

impl StorePodLister {
    /// Wrap a reflector store.
    pub fn new(store: Store<Pod>) -> Self {
        Self { store }
    }
}

impl PodLister for StorePodLister {
    fn get(&self, namespace: &str, name: &str) -> Result<Pod, LookupError> {
        let key = ObjectRef::new(name).within(namespace);
        self.store
            .get(&key)
            .map(|pod| pod.as_ref().clone())
            .ok_or_else(|| LookupError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// In-memory [`PodLister`] for tests and dry runs.
///
/// Individual pods can be made to fail with an arbitrary lister error to
/// exercise the fatal error path.
#[derive(Clone, Default)]
pub struct InMemoryPodLister {
    pods: Arc<RwLock<BTreeMap<(String, String), Pod>>>,
    failures: Arc<RwLock<BTreeMap<(String, String), String>>>,
}

impl InMemoryPodLister {
    /// Create an empty lister.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pod. The key is taken from its metadata.
    pub fn insert(&self, pod: Pod) {
        let key = (
            pod.metadata.namespace.clone().unwrap_or_default(),
            pod.metadata.name.clone().unwrap_or_default(),
        );
        if let Ok(mut pods) = self.pods.write() {
            pods.insert(key, pod);
        }
    }

    /// Remove a pod, as the StatefulSet controller does when replacing it.
    pub fn remove(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .write()
            .ok()
            .and_then(|mut pods| pods.remove(&(namespace.to_string(), name.to_string())))
    }

    /// Make lookups of one pod fail with `LookupError::Other`.
    pub fn fail_with(&self, namespace: &str, name: &str, message: &str) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(
                (namespace.to_string(), name.to_string()),
                message.to_string(),
            );
        }
    }
}

impl PodLister for InMemoryPodLister {
    fn get(&self, namespace: &str, name: &str) -> Result<Pod, LookupError> {
        let key = (namespace.to_string(), name.to_string());
        let failure = self
            .failures
            .read()
            .map_err(|e| LookupError::Other(e.to_string()))?
            .get(&key)
            .cloned();
        if let Some(message) = failure {
            return Err(LookupError::Other(message));
        }

        self.pods
            .read()
            .map_err(|e| LookupError::Other(e.to_string()))?
            .get(&key)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
