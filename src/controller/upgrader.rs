//! Per-role rolling upgrade state machine.
//!
//! Each call decides one step of a role's rolling upgrade from cached state
//! alone. Guards run in a fixed order and the first one that fires ends the
//! call:
//!
//! 1. role has no replicas: nothing to do
//! 2. a blocking role is upgrading or scaling, or this role is scaling:
//!    keep the last applied pod template and wait
//! 3. mark the role `Upgrade`
//! 4. new template not yet accepted: wait
//! 5. revisions converged: nothing to do
//! 6. update strategy edited to bypass the operator: keep the edit
//! 7. walk ordinals from the highest down and lower the partition to the
//!    first pod still on the old revision
//!
//! Everything is re-derived on every call, so an interrupted upgrade resumes
//! where it stopped and repeated calls with the same inputs agree.

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::controller::context::UpgradeContext;
use crate::controller::error::{Error, LookupError, Result};
use crate::controller::ordinals::{partition_for_ordinal, pod_name, pod_ordinals};
use crate::controller::partition::{current_partition, is_manual_bypass, set_upgrade_partition};
use crate::controller::pod_health::{MemberHealthCheck, check_upgraded_pod};
use crate::controller::revision::{last_applied_config, pod_revision};
use crate::controller::template::template_equal;
use crate::controller::upgrade_order::UpgradeOrder;
use crate::crd::{DbCluster, MemberPhase, Role, StatefulSetRevisionStatus};

/// Drives the rolling upgrade of one role.
pub trait Upgrader: Send + Sync {
    /// Advance the upgrade by at most one pod.
    ///
    /// Mutates `cluster.status` and `new_set` in place; the caller persists
    /// them. `old_set` is the live StatefulSet.
    fn upgrade(
        &self,
        cluster: &mut DbCluster,
        old_set: &StatefulSet,
        new_set: &mut StatefulSet,
    ) -> Result<()>;
}

/// What a single upgrade call decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The role has no replicas.
    Skipped,
    /// Another role, or this role's own scaling, holds the upgrade.
    Deferred {
        /// Role that holds the upgrade
        blocked_by: Role,
        /// Its phase
        phase: MemberPhase,
    },
    /// The new template differs from the last applied one.
    TemplatePending,
    /// Current and update revisions already match.
    Converged,
    /// The update strategy was switched away from a partitioned rolling update.
    ManualBypass,
    /// The partition was lowered to release one more pod.
    Released {
        /// New partition
        ordinal: i32,
    },
    /// A pod at or above the partition is still being replaced.
    Holding {
        /// Unchanged partition
        partition: i32,
    },
    /// Every pod runs the update revision and is healthy.
    AllUpgraded,
}

impl UpgradeOutcome {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            UpgradeOutcome::Skipped => "skipped",
            UpgradeOutcome::Deferred { .. } => "blocked",
            UpgradeOutcome::TemplatePending => "template-pending",
            UpgradeOutcome::Converged => "converged",
            UpgradeOutcome::ManualBypass => "manual-bypass",
            UpgradeOutcome::Released { .. } => "released",
            UpgradeOutcome::Holding { .. } => "holding",
            UpgradeOutcome::AllUpgraded => "all-upgraded",
        }
    }
}

impl std::fmt::Display for UpgradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeOutcome::Skipped => write!(f, "Skipped"),
            UpgradeOutcome::Deferred { blocked_by, phase } => {
                write!(f, "Deferred({blocked_by} is {phase})")
            }
            UpgradeOutcome::TemplatePending => write!(f, "TemplatePending"),
            UpgradeOutcome::Converged => write!(f, "Converged"),
            UpgradeOutcome::ManualBypass => write!(f, "ManualBypass"),
            UpgradeOutcome::Released { ordinal } => write!(f, "Released({ordinal})"),
            UpgradeOutcome::Holding { partition } => write!(f, "Holding({partition})"),
            UpgradeOutcome::AllUpgraded => write!(f, "AllUpgraded"),
        }
    }
}

/// [`Upgrader`] for one role.
///
/// Roles differ only in data: the blockers from [`UpgradeOrder`] and the
/// member health check.
#[derive(Clone)]
pub struct RoleUpgrader {
    role: Role,
    health_check: MemberHealthCheck,
    ctx: UpgradeContext,
}

impl RoleUpgrader {
    /// Create an upgrader for `role`.
    pub fn new(role: Role, ctx: UpgradeContext) -> Self {
        Self {
            role,
            health_check: MemberHealthCheck::for_role(role),
            ctx,
        }
    }

    pub fn coordinator(ctx: UpgradeContext) -> Self {
        Self::new(Role::Coordinator, ctx)
    }

    pub fn storage(ctx: UpgradeContext) -> Self {
        Self::new(Role::Storage, ctx)
    }

    pub fn gateway(ctx: UpgradeContext) -> Self {
        Self::new(Role::Gateway, ctx)
    }

    pub fn cdc_source(ctx: UpgradeContext) -> Self {
        Self::new(Role::CdcSource, ctx)
    }

    pub fn cdc_sink(ctx: UpgradeContext) -> Self {
        Self::new(Role::CdcSink, ctx)
    }

    pub fn auxiliary_monitor(ctx: UpgradeContext) -> Self {
        Self::new(Role::AuxiliaryMonitor, ctx)
    }

    /// Role this upgrader drives.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Run one upgrade step and report which guard decided it.
    pub fn plan(
        &self,
        cluster: &mut DbCluster,
        old_set: &StatefulSet,
        new_set: &mut StatefulSet,
    ) -> Result<UpgradeOutcome> {
        let role = self.role;
        let cluster_name = cluster_key(cluster);

        // ====================================================================
        // Guards
        // ====================================================================

        if cluster.desired_replicas(role) <= 0 {
            return Ok(UpgradeOutcome::Skipped);
        }

        if let Some((blocked_by, phase)) =
            UpgradeOrder::for_cluster(cluster).blocking_role(cluster, role)
        {
            let (_, pod_spec) = last_applied_config(old_set)?;
            if let Some(spec) = new_set.spec.as_mut() {
                spec.template.spec = Some(pod_spec);
            }
            debug!(
                cluster = %cluster_name,
                role = %role,
                blocked_by = %blocked_by,
                phase = %phase,
                "Upgrade deferred, keeping last applied pod template"
            );
            return Ok(UpgradeOutcome::Deferred { blocked_by, phase });
        }

        let status = cluster.role_status_mut(role);
        if status.phase != MemberPhase::Upgrade {
            info!(
                cluster = %cluster_name,
                role = %role,
                from = %status.phase,
                "Role entering Upgrade phase"
            );
            status.phase = MemberPhase::Upgrade;
        }

        if !template_equal(new_set, old_set) {
            debug!(
                cluster = %cluster_name,
                role = %role,
                "Pod template not yet applied, waiting"
            );
            return Ok(UpgradeOutcome::TemplatePending);
        }

        let revisions = self.revisions(cluster, old_set);
        if revisions.revisions_converged() {
            return Ok(UpgradeOutcome::Converged);
        }

        let old_strategy = old_set.spec.as_ref().and_then(|s| s.update_strategy.as_ref());
        if is_manual_bypass(old_strategy) {
            if let Some(spec) = new_set.spec.as_mut() {
                spec.update_strategy = old_strategy.cloned();
            }
            warn!(
                cluster = %cluster_name,
                role = %role,
                strategy = ?old_strategy.and_then(|s| s.type_.as_deref()),
                "Update strategy was changed outside the operator, not driving the partition"
            );
            return Ok(UpgradeOutcome::ManualBypass);
        }

        // ====================================================================
        // Ordinal walk
        // ====================================================================

        let old_partition = current_partition(old_set).unwrap_or(0);
        set_upgrade_partition(new_set, old_partition);

        let Some(update_revision) = revisions.update_revision.as_deref() else {
            return Err(Error::requeue(format!(
                "cluster {cluster_name}: {role} statefulset has no update revision yet"
            )));
        };

        let cluster_label = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_default();
        let replicas = old_set
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or_else(|| cluster.desired_replicas(role));

        for ordinal in pod_ordinals(replicas, old_set).into_iter().rev() {
            let name = pod_name(&cluster_label, role, ordinal);
            let pod = match self.ctx.pods.get(&namespace, &name) {
                Ok(pod) => pod,
                Err(LookupError::NotFound { .. }) => {
                    return Err(Error::requeue(format!(
                        "cluster {cluster_name}: pod {name} not found"
                    )));
                }
                Err(source) => {
                    return Err(Error::PodLookup {
                        cluster: cluster_name,
                        pod: name,
                        source,
                    });
                }
            };

            let Some(revision) = pod_revision(&pod) else {
                return Err(Error::requeue(format!(
                    "cluster {cluster_name}: pod {name} has no revision label"
                )));
            };

            if revision == update_revision {
                check_upgraded_pod(
                    &cluster_name,
                    &pod,
                    &name,
                    cluster.role_status(role),
                    self.health_check,
                )?;
                continue;
            }

            let partition = partition_for_ordinal(ordinal, old_set);
            if partition >= old_partition {
                debug!(
                    cluster = %cluster_name,
                    role = %role,
                    pod = %name,
                    partition = old_partition,
                    "Pod released but not yet replaced"
                );
                return Ok(UpgradeOutcome::Holding {
                    partition: old_partition,
                });
            }

            set_upgrade_partition(new_set, partition);
            info!(
                cluster = %cluster_name,
                role = %role,
                pod = %name,
                partition,
                "Releasing pod for upgrade"
            );
            return Ok(UpgradeOutcome::Released { ordinal });
        }

        Ok(UpgradeOutcome::AllUpgraded)
    }

    /// Revisions observed for the role, falling back to the live set status.
    fn revisions(&self, cluster: &DbCluster, old_set: &StatefulSet) -> StatefulSetRevisionStatus {
        cluster
            .role_status(self.role)
            .and_then(|s| s.stateful_set.clone())
            .or_else(|| old_set.status.as_ref().map(StatefulSetRevisionStatus::from))
            .unwrap_or_default()
    }

    fn record(&self, cluster: &DbCluster, new_set: &StatefulSet, result: &Result<UpgradeOutcome>) {
        let Some(metrics) = self.ctx.metrics.as_ref() else {
            return;
        };
        let namespace = cluster.namespace().unwrap_or_default();
        let name = cluster.name_any();

        match result {
            Ok(UpgradeOutcome::Released { .. }) => {
                if let Some(partition) = current_partition(new_set) {
                    metrics.record_step(&namespace, &name, self.role, partition);
                }
            }
            Ok(UpgradeOutcome::Holding { .. } | UpgradeOutcome::AllUpgraded) => {
                if let Some(partition) = current_partition(new_set) {
                    metrics.set_partition(&namespace, &name, self.role, partition);
                }
            }
            Ok(outcome @ (UpgradeOutcome::Deferred { .. } | UpgradeOutcome::TemplatePending)) => {
                metrics.record_deferral(&namespace, &name, self.role, outcome.reason());
            }
            Ok(_) => {}
            Err(e) if e.is_retryable() => {
                metrics.record_deferral(&namespace, &name, self.role, "requeue");
            }
            Err(_) => {}
        }
    }
}

impl Upgrader for RoleUpgrader {
    fn upgrade(
        &self,
        cluster: &mut DbCluster,
        old_set: &StatefulSet,
        new_set: &mut StatefulSet,
    ) -> Result<()> {
        let result = self.plan(cluster, old_set, new_set);
        self.record(cluster, new_set, &result);
        if let Err(e) = &result
            && e.is_retryable()
        {
            debug!(
                cluster = %cluster_key(cluster),
                role = %self.role,
                reason = %e,
                "Upgrade step not ready"
            );
        }
        result.map(|_| ())
    }
}

/// Upgrader for tests that only marks the role as upgrading.
#[derive(Clone, Copy, Debug)]
pub struct FakeUpgrader {
    role: Role,
}

impl FakeUpgrader {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Upgrader for FakeUpgrader {
    fn upgrade(
        &self,
        cluster: &mut DbCluster,
        _old_set: &StatefulSet,
        _new_set: &mut StatefulSet,
    ) -> Result<()> {
        cluster.role_status_mut(self.role).phase = MemberPhase::Upgrade;
        Ok(())
    }
}

/// `namespace/name` of a cluster, for messages.
fn cluster_key(cluster: &DbCluster) -> String {
    format!(
        "{}/{}",
        cluster.namespace().unwrap_or_default(),
        cluster.name_any()
    )
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use k8s_openapi::api::apps::v1::{StatefulSetSpec, StatefulSetStatus, StatefulSetUpdateStrategy};
    use k8s_openapi::api::core::v1::{
        Container, Pod, PodCondition, PodSpec, PodStatus, PodTemplateSpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::controller::partition::{ON_DELETE, rolling_update_strategy};
    use crate::controller::pod_lister::InMemoryPodLister;
    use crate::controller::revision::{CONTROLLER_REVISION_HASH_LABEL, set_last_applied_config};
    use crate::crd::{ComponentSpec, DbClusterSpec, MemberState, MemberStatus};
    use crate::metrics::UpgradeMetrics;

    const OLD: &str = "db-gateway-old";
    const NEW: &str = "db-gateway-new";

    struct Fixture {
        cluster: DbCluster,
        old_set: StatefulSet,
        new_set: StatefulSet,
        pods: InMemoryPodLister,
        metrics: Arc<UpgradeMetrics>,
        upgrader: RoleUpgrader,
    }

    fn statefulset(image: &str, partition: i32) -> StatefulSet {
        let mut set = StatefulSet {
            metadata: ObjectMeta {
                name: Some("db-gateway".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(3),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "gateway".to_string(),
                            image: Some(image.to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                update_strategy: Some(rolling_update_strategy(partition)),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                current_revision: Some(OLD.to_string()),
                update_revision: Some(NEW.to_string()),
                replicas: 3,
                ..Default::default()
            }),
        };
        set_last_applied_config(&mut set).unwrap();
        set
    }

    fn pod(ordinal: i32, revision: Option<&str>, ready: bool) -> Pod {
        let mut labels = BTreeMap::new();
        if let Some(revision) = revision {
            labels.insert(CONTROLLER_REVISION_HASH_LABEL.to_string(), revision.to_string());
        }
        Pod {
            metadata: ObjectMeta {
                name: Some(format!("db-gateway-{ordinal}")),
                namespace: Some("ns".to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Gateway with 3 replicas mid-upgrade: the live set already carries the
    /// new template, every pod is still on the old revision.
    fn fixture() -> Fixture {
        let mut cluster = DbCluster::new(
            "db",
            DbClusterSpec {
                coordinator: Some(ComponentSpec { replicas: 3, image: None }),
                storage: Some(ComponentSpec { replicas: 3, image: None }),
                gateway: Some(ComponentSpec { replicas: 3, image: None }),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("ns".to_string());

        let old_set = statefulset("gateway:v2", 3);
        let new_set = statefulset("gateway:v2", 3);
        cluster.role_status_mut(Role::Gateway).stateful_set =
            old_set.status.as_ref().map(StatefulSetRevisionStatus::from);
        for ordinal in 0..3 {
            cluster.role_status_mut(Role::Gateway).members.insert(
                format!("db-gateway-{ordinal}"),
                MemberStatus {
                    name: format!("db-gateway-{ordinal}"),
                    health: true,
                    ..Default::default()
                },
            );
        }

        let pods = InMemoryPodLister::new();
        for ordinal in 0..3 {
            pods.insert(pod(ordinal, Some(OLD), true));
        }
        let metrics = Arc::new(UpgradeMetrics::new());
        let ctx = UpgradeContext::new(Arc::new(pods.clone()), Some(metrics.clone()));

        Fixture {
            cluster,
            old_set,
            new_set,
            pods,
            metrics,
            upgrader: RoleUpgrader::gateway(ctx),
        }
    }

    impl Fixture {
        fn plan(&mut self) -> Result<UpgradeOutcome> {
            self.upgrader
                .plan(&mut self.cluster, &self.old_set, &mut self.new_set)
        }

        fn upgrade(&mut self) -> Result<()> {
            self.upgrader
                .upgrade(&mut self.cluster, &self.old_set, &mut self.new_set)
        }

        fn new_partition(&self) -> Option<i32> {
            current_partition(&self.new_set)
        }
    }

    #[test]
    fn test_zero_replicas_is_noop() {
        let mut f = fixture();
        f.cluster.spec.gateway = Some(ComponentSpec { replicas: 0, image: None });
        let before = f.new_set.clone();

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Skipped);
        assert_eq!(f.new_set, before);
        assert_eq!(f.cluster.role_phase(Role::Gateway), MemberPhase::Normal);

        f.cluster.spec.gateway = None;
        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Skipped);
    }

    #[test]
    fn test_deferred_restores_template() {
        let mut f = fixture();
        f.cluster.role_status_mut(Role::Storage).phase = MemberPhase::Upgrade;
        f.new_set = statefulset("gateway:v3", 3);

        assert_eq!(
            f.plan().unwrap(),
            UpgradeOutcome::Deferred {
                blocked_by: Role::Storage,
                phase: MemberPhase::Upgrade
            }
        );
        let image = f.new_set.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
            .image
            .clone();
        assert_eq!(image.as_deref(), Some("gateway:v2"));
        assert_eq!(f.cluster.role_phase(Role::Gateway), MemberPhase::Normal);
    }

    #[test]
    fn test_deferred_without_last_applied_is_fatal() {
        let mut f = fixture();
        f.cluster.role_status_mut(Role::Gateway).phase = MemberPhase::ScaleOut;
        f.old_set.metadata.annotations = None;

        let err = f.plan().unwrap_err();
        assert!(matches!(err, Error::LastAppliedConfig(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_template_pending() {
        let mut f = fixture();
        f.new_set = statefulset("gateway:v3", 3);

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::TemplatePending);
        assert_eq!(f.cluster.role_phase(Role::Gateway), MemberPhase::Upgrade);
        assert_eq!(f.new_partition(), Some(3));
    }

    #[test]
    fn test_converged_revisions() {
        let mut f = fixture();
        let status = f.cluster.role_status_mut(Role::Gateway);
        status.stateful_set.as_mut().unwrap().current_revision = Some(NEW.to_string());

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Converged);
        assert_eq!(f.cluster.role_phase(Role::Gateway), MemberPhase::Upgrade);
    }

    #[test]
    fn test_manual_bypass_copies_strategy() {
        let mut f = fixture();
        let on_delete = StatefulSetUpdateStrategy {
            type_: Some(ON_DELETE.to_string()),
            rolling_update: None,
        };
        f.old_set.spec.as_mut().unwrap().update_strategy = Some(on_delete.clone());

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::ManualBypass);
        assert_eq!(
            f.new_set.spec.as_ref().unwrap().update_strategy,
            Some(on_delete)
        );
    }

    #[test]
    fn test_releases_highest_old_ordinal() {
        let mut f = fixture();
        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Released { ordinal: 2 });
        assert_eq!(f.new_partition(), Some(2));
    }

    #[test]
    fn test_partition_follows_upgraded_pods() {
        let mut f = fixture();
        f.old_set = statefulset("gateway:v2", 2);
        f.pods.insert(pod(2, Some(NEW), true));

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Released { ordinal: 1 });
        assert_eq!(f.new_partition(), Some(1));
    }

    #[test]
    fn test_upgraded_pod_not_ready_requeues() {
        let mut f = fixture();
        f.old_set = statefulset("gateway:v2", 2);
        f.new_set = statefulset("gateway:v2", 2);
        f.pods.insert(pod(2, Some(NEW), false));

        let err = f.plan().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.new_partition(), Some(2));
    }

    #[test]
    fn test_upgraded_pod_unhealthy_requeues() {
        let mut f = fixture();
        f.old_set = statefulset("gateway:v2", 2);
        f.pods.insert(pod(2, Some(NEW), true));
        f.cluster
            .role_status_mut(Role::Gateway)
            .members
            .get_mut("db-gateway-2")
            .unwrap()
            .health = false;

        assert!(matches!(f.plan(), Err(Error::Requeue(_))));
    }

    #[test]
    fn test_storage_requires_up_state() {
        let mut f = fixture();
        f.upgrader = RoleUpgrader::storage(f.upgrader.ctx.clone());
        f.cluster.role_status_mut(Role::Storage).stateful_set =
            f.old_set.status.as_ref().map(StatefulSetRevisionStatus::from);
        f.old_set.metadata.name = Some("db-storage".to_string());
        let mut upgraded = pod(2, Some(NEW), true);
        upgraded.metadata.name = Some("db-storage-2".to_string());
        f.pods.insert(upgraded);
        f.cluster.role_status_mut(Role::Storage).members.insert(
            "db-storage-2".to_string(),
            MemberStatus {
                health: true,
                state: Some(MemberState::Offline),
                ..Default::default()
            },
        );

        assert!(matches!(f.plan(), Err(Error::Requeue(_))));

        f.cluster
            .role_status_mut(Role::Storage)
            .members
            .get_mut("db-storage-2")
            .unwrap()
            .state = Some(MemberState::Up);
        let mut old = pod(1, Some(OLD), true);
        old.metadata.name = Some("db-storage-1".to_string());
        f.pods.insert(old);
        f.old_set = statefulset("gateway:v2", 2);

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Released { ordinal: 1 });
    }

    #[test]
    fn test_missing_revision_label_requeues() {
        let mut f = fixture();
        f.pods.insert(pod(2, None, true));
        assert!(matches!(f.plan(), Err(Error::Requeue(_))));
    }

    #[test]
    fn test_missing_pod_requeues() {
        let mut f = fixture();
        f.pods.remove("ns", "db-gateway-2");
        let err = f.plan().unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("db-gateway-2"));
    }

    #[test]
    fn test_lister_failure_is_fatal() {
        let mut f = fixture();
        f.pods.fail_with("ns", "db-gateway-2", "cache unavailable");
        let err = f.plan().unwrap_err();
        assert!(matches!(err, Error::PodLookup { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_partition_never_raised() {
        let mut f = fixture();
        f.old_set = statefulset("gateway:v2", 0);

        assert_eq!(f.plan().unwrap(), UpgradeOutcome::Holding { partition: 0 });
        assert_eq!(f.new_partition(), Some(0));
    }

    #[test]
    fn test_all_upgraded() {
        let mut f = fixture();
        f.old_set = statefulset("gateway:v2", 0);
        for ordinal in 0..3 {
            f.pods.insert(pod(ordinal, Some(NEW), true));
        }
        assert_eq!(f.plan().unwrap(), UpgradeOutcome::AllUpgraded);
    }

    #[test]
    fn test_upgrade_records_metrics() {
        let mut f = fixture();
        f.upgrade().unwrap();

        let text = f.metrics.encode_text();
        assert!(text.contains("dbcluster_upgrade_steps_total"));
        assert!(text.contains(r#"role="gateway""#));
    }

    #[test]
    fn test_fake_upgrader_only_sets_phase() {
        let mut f = fixture();
        let before = f.new_set.clone();
        FakeUpgrader::new(Role::Gateway)
            .upgrade(&mut f.cluster, &f.old_set, &mut f.new_set)
            .unwrap();
        assert_eq!(f.cluster.role_phase(Role::Gateway), MemberPhase::Upgrade);
        assert_eq!(f.new_set, before);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            UpgradeOutcome::Deferred {
                blocked_by: Role::Storage,
                phase: MemberPhase::ScaleIn
            }
            .to_string(),
            "Deferred(storage is ScaleIn)"
        );
        assert_eq!(UpgradeOutcome::Released { ordinal: 1 }.to_string(), "Released(1)");
    }
}
