//! Prometheus metrics for rolling upgrades.
//!
//! The registry is owned here and exposed as text; serving it is left to the
//! embedding operator.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::crd::Role;

/// Labels for per-role metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RoleLabels {
    pub namespace: String,
    pub cluster: String,
    pub role: String,
}

impl EncodeLabelSet for RoleLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        ("role", self.role.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for deferred upgrade attempts
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DeferralLabels {
    pub namespace: String,
    pub cluster: String,
    pub role: String,
    pub reason: String,
}

impl EncodeLabelSet for DeferralLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("cluster", self.cluster.as_str()).encode(encoder.encode_label())?;
        ("role", self.role.as_str()).encode(encoder.encode_label())?;
        ("reason", self.reason.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Upgrade metrics
pub struct UpgradeMetrics {
    /// Pods released for replacement by lowering the partition
    pub upgrade_steps_total: Family<RoleLabels, Counter>,
    /// Upgrade attempts that did not move the partition
    pub upgrade_deferrals_total: Family<DeferralLabels, Counter>,
    /// Partition last written per role
    pub upgrade_partition: Family<RoleLabels, Gauge>,
    registry: Registry,
}

impl Default for UpgradeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeMetrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let upgrade_steps_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "dbcluster_upgrade_steps",
            "Total number of pods released for upgrade",
            upgrade_steps_total.clone(),
        );

        let upgrade_deferrals_total = Family::<DeferralLabels, Counter>::default();
        registry.register(
            "dbcluster_upgrade_deferrals",
            "Total number of upgrade attempts that did not advance",
            upgrade_deferrals_total.clone(),
        );

        let upgrade_partition = Family::<RoleLabels, Gauge>::default();
        registry.register(
            "dbcluster_upgrade_partition",
            "Rolling update partition written for each role",
            upgrade_partition.clone(),
        );

        Self {
            upgrade_steps_total,
            upgrade_deferrals_total,
            upgrade_partition,
            registry,
        }
    }

    /// Record a pod released at `partition`
    pub fn record_step(&self, namespace: &str, cluster: &str, role: Role, partition: i32) {
        let labels = role_labels(namespace, cluster, role);
        self.upgrade_steps_total.get_or_create(&labels).inc();
        self.upgrade_partition
            .get_or_create(&labels)
            .set(i64::from(partition));
    }

    /// Record the partition without counting a step
    pub fn set_partition(&self, namespace: &str, cluster: &str, role: Role, partition: i32) {
        self.upgrade_partition
            .get_or_create(&role_labels(namespace, cluster, role))
            .set(i64::from(partition));
    }

    /// Record an attempt that did not advance
    pub fn record_deferral(&self, namespace: &str, cluster: &str, role: Role, reason: &str) {
        let labels = DeferralLabels {
            namespace: namespace.to_string(),
            cluster: cluster.to_string(),
            role: role.as_str().to_string(),
            reason: reason.to_string(),
        };
        self.upgrade_deferrals_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode_text(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

fn role_labels(namespace: &str, cluster: &str, role: Role) -> RoleLabels {
    RoleLabels {
        namespace: namespace.to_string(),
        cluster: cluster.to_string(),
        role: role.as_str().to_string(),
    }
}
