//! Cross-role upgrade ordering.
//!
//! A role may only roll while none of its blocking roles is upgrading or
//! scaling, and while it is not scaling itself. The table below is the
//! default order; `DbClusterSpec::upgrade_order` replaces the blockers of
//! individual roles.

use std::collections::{BTreeMap, BTreeSet};

use tracing::error;

use crate::crd::{DbCluster, MemberPhase, Role};

/// Partial order of roles: role -> roles that must be settled first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOrder {
    blockers: BTreeMap<Role, Vec<Role>>,
}

impl Default for UpgradeOrder {
    fn default() -> Self {
        use Role::*;
        Self {
            blockers: BTreeMap::from([
                (Coordinator, vec![]),
                (Storage, vec![Coordinator]),
                (CdcSource, vec![Coordinator, Storage]),
                (Gateway, vec![Coordinator, Storage, CdcSource]),
                (CdcSink, vec![Coordinator, Storage, Gateway]),
                (AuxiliaryMonitor, vec![Coordinator]),
            ]),
        }
    }
}

impl UpgradeOrder {
    /// Default order with the blockers of some roles replaced.
    ///
    /// A role listed as its own blocker is dropped, since a role in `Upgrade`
    /// would otherwise block itself forever.
    pub fn with_overrides(overrides: &BTreeMap<Role, Vec<Role>>) -> Self {
        let mut order = Self::default();
        for (role, blockers) in overrides {
            let mut seen = BTreeSet::new();
            let blockers = blockers
                .iter()
                .copied()
                .filter(|b| b != role && seen.insert(*b))
                .collect();
            order.blockers.insert(*role, blockers);
        }
        order
    }

    /// Order configured for a cluster.
    ///
    /// A cyclic override could hold two upgrading roles against each other,
    /// so it is rejected in favour of the default order.
    pub fn for_cluster(cluster: &DbCluster) -> Self {
        let Some(overrides) = cluster.spec.upgrade_order.as_ref() else {
            return Self::default();
        };
        let order = Self::with_overrides(overrides);
        if let Some(role) = order.find_cycle() {
            error!(
                cluster = %cluster.metadata.name.as_deref().unwrap_or_default(),
                role = %role,
                "Upgrade order override is cyclic, using default order"
            );
            return Self::default();
        }
        order
    }

    /// Roles that must be settled before `role` may roll.
    pub fn blockers(&self, role: Role) -> &[Role] {
        self.blockers.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first reason `role` may not roll right now.
    ///
    /// Returns the blocking role (possibly `role` itself) with its phase.
    pub fn blocking_role(&self, cluster: &DbCluster, role: Role) -> Option<(Role, MemberPhase)> {
        let blocked_by = self.blockers(role).iter().find_map(|&blocker| {
            let phase = cluster.role_phase(blocker);
            (phase == MemberPhase::Upgrade || phase.is_scaling()).then_some((blocker, phase))
        });
        if blocked_by.is_some() {
            return blocked_by;
        }

        let phase = cluster.role_phase(role);
        phase.is_scaling().then_some((role, phase))
    }

    /// A role that sits on a blocking cycle, if any.
    fn find_cycle(&self) -> Option<Role> {
        Role::ALL
            .into_iter()
            .find(|&role| self.reaches(role, role, &mut BTreeSet::new()))
    }

    fn reaches(&self, from: Role, target: Role, visited: &mut BTreeSet<Role>) -> bool {
        for &next in self.blockers(from) {
            if next == target {
                return true;
            }
            if visited.insert(next) && self.reaches(next, target, visited) {
                return true;
            }
        }
        false
    }
}
