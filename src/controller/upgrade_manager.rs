//! Per-role upgrade reconciliation.
//!
//! Wraps a role's [`Upgrader`] with the bookkeeping around it: copying the
//! live StatefulSet status into the cluster status, leaving the `Upgrade`
//! phase once the StatefulSet has settled, deciding whether the upgrader has
//! anything to do, and keeping the `Upgrading` condition current.

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::info;

use crate::controller::error::Result;
use crate::controller::revision::statefulset_is_upgrading;
use crate::controller::status::ConditionBuilder;
use crate::controller::template::template_equal;
use crate::controller::upgrader::Upgrader;
use crate::crd::{DbCluster, DbClusterStatus, MemberPhase, Role, StatefulSetRevisionStatus};

/// Reason set on the Upgrading condition while a role upgrades.
pub const REASON_ROLE_UPGRADING: &str = "RoleUpgrading";
/// Reason set on the Upgrading condition when no role upgrades.
pub const REASON_UPGRADE_IDLE: &str = "NoUpgradeInProgress";

/// Copy the live StatefulSet status into the role status.
pub fn observe_statefulset(cluster: &mut DbCluster, role: Role, set: &StatefulSet) {
    let observed = set.status.as_ref().map(StatefulSetRevisionStatus::from);
    cluster.role_status_mut(role).stateful_set = observed;
}

/// Leave the `Upgrade` phase once the StatefulSet is no longer rolling.
///
/// Other phases are owned by other controllers and left alone.
pub fn sync_phase(cluster: &mut DbCluster, role: Role, set: &StatefulSet) {
    if cluster.role_phase(role) != MemberPhase::Upgrade || statefulset_is_upgrading(set) {
        return;
    }
    info!(
        cluster = %cluster.name_any(),
        role = %role,
        "Upgrade finished, role back to Normal"
    );
    cluster.role_status_mut(role).phase = MemberPhase::Normal;
}

/// Whether the role's upgrader has to run.
///
/// True when the desired template differs from the applied one, or when an
/// upgrade is already in progress.
pub fn should_upgrade(
    cluster: &DbCluster,
    role: Role,
    old_set: &StatefulSet,
    new_set: &StatefulSet,
) -> bool {
    cluster.role_phase(role) == MemberPhase::Upgrade || !template_equal(new_set, old_set)
}

/// Set the Upgrading condition from the role phases.
pub fn update_upgrading_condition(cluster: &mut DbCluster) {
    let generation = cluster.metadata.generation;
    let upgrading: Vec<&str> = Role::ALL
        .into_iter()
        .filter(|&role| cluster.role_phase(role) == MemberPhase::Upgrade)
        .map(|role| role.as_str())
        .collect();

    let status = cluster.status.get_or_insert_with(DbClusterStatus::default);
    let mut builder = ConditionBuilder::from_existing(&status.conditions);
    if upgrading.is_empty() {
        builder.upgrading(
            false,
            REASON_UPGRADE_IDLE,
            "No role is upgrading",
            generation,
        );
    } else {
        builder.upgrading(
            true,
            REASON_ROLE_UPGRADING,
            &format!("Upgrading: {}", upgrading.join(", ")),
            generation,
        );
    }
    status.conditions = builder.build();
}

/// Run one upgrade reconciliation for a role.
///
/// The condition is refreshed even when the upgrader returns an error.
pub fn reconcile_role_upgrade(
    upgrader: &dyn Upgrader,
    role: Role,
    cluster: &mut DbCluster,
    old_set: &StatefulSet,
    new_set: &mut StatefulSet,
) -> Result<()> {
    observe_statefulset(cluster, role, old_set);
    sync_phase(cluster, role, old_set);

    let result = if should_upgrade(cluster, role, old_set, new_set) {
        upgrader.upgrade(cluster, old_set, new_set)
    } else {
        Ok(())
    };

    update_upgrading_condition(cluster);
    result
}
