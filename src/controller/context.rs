//! Shared context for the upgraders.
//!
//! Holds the read-only collaborators an upgrader needs: the pod cache and,
//! optionally, the metrics registry.

use std::sync::Arc;

use crate::controller::pod_lister::PodLister;
use crate::metrics::UpgradeMetrics;

/// Field manager name for the operator
pub const FIELD_MANAGER: &str = "dbcluster-operator";

/// Shared context for the upgraders
#[derive(Clone)]
pub struct UpgradeContext {
    /// Pod cache
    pub pods: Arc<dyn PodLister>,
    /// Optional metrics for upgrade progress
    pub metrics: Option<Arc<UpgradeMetrics>>,
}

impl UpgradeContext {
    /// Create a new context
    pub fn new(pods: Arc<dyn PodLister>, metrics: Option<Arc<UpgradeMetrics>>) -> Self {
        Self { pods, metrics }
    }
}
