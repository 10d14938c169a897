//! Error types for the upgrade controller.
//!
//! Errors fall into two classes. `Requeue` means cluster state has not
//! converged yet and the caller should try again later. Everything else is
//! an unexpected collaborator failure that is propagated as-is.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// State not yet converged; re-invoke after a backoff
    #[error("Requeue: {0}")]
    Requeue(String),

    /// Pod lookup failed for a reason other than not-found
    #[error("Failed to get pod {pod} for cluster {cluster}: {source}")]
    PodLookup {
        /// Cluster as namespace/name
        cluster: String,
        /// Pod name that was looked up
        pod: String,
        /// Underlying lister error
        #[source]
        source: LookupError,
    },

    /// Last-applied configuration missing or unreadable
    #[error("Last applied config error: {0}")]
    LastAppliedConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a retryable error from a formatted reason.
    pub fn requeue(reason: impl Into<String>) -> Self {
        Error::Requeue(reason.into())
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Requeue(_) => true,
            Error::PodLookup { .. } | Error::LastAppliedConfig(_) | Error::Serialization(_) => {
                false
            }
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self) -> Duration {
        match self {
            // Rollout steps converge in seconds; poll quickly
            Error::Requeue(_) => Duration::from_secs(10),
            _ => Duration::from_secs(300),
        }
    }
}

/// Error returned by a [`PodLister`](crate::controller::pod_lister::PodLister).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The object is not in the cache
    #[error("{namespace}/{name} not found")]
    NotFound {
        /// Namespace that was searched
        namespace: String,
        /// Object name
        name: String,
    },

    /// Any other lister failure
    #[error("{0}")]
    Other(String),
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
