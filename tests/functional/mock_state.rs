//! Mock infrastructure for simulating rolling upgrades in functional tests.
//!
//! `MockDbCluster` holds a DbCluster, the live StatefulSet of every deployed
//! role and the pods behind them, without a Kubernetes cluster.
//!
//! ## Design Philosophy
//!
//! Instead of duplicating production logic, this mock:
//! 1. Runs the real `reconcile_role_upgrade` and `RoleUpgrader` for the operator side
//! 2. Simulates only what other controllers do: the StatefulSet controller
//!    replacing pods at or above the partition, and the database reporting
//!    member health once a replaced pod is ready
//!
//! A round reconciles every role once, then lets every StatefulSet take one
//! step, so each test reads as a sequence of operator ticks.

use std::collections::BTreeMap;
use std::sync::Arc;

use dbcluster_operator::controller::ordinals::{partition_for_ordinal, pod_name, pod_ordinals};
use dbcluster_operator::controller::partition::{ON_DELETE, current_partition, rolling_update_strategy};
use dbcluster_operator::controller::pod_health::is_pod_ready;
use dbcluster_operator::controller::revision::{pod_revision, set_last_applied_config};
use dbcluster_operator::controller::upgrade_manager::reconcile_role_upgrade;
use dbcluster_operator::controller::{InMemoryPodLister, PodLister, RoleUpgrader, UpgradeContext};
use dbcluster_operator::crd::{DbCluster, MemberPhase, Role};
use dbcluster_operator::{Error, UpgradeMetrics};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetUpdateStrategy};

use crate::common::fixtures::{
    CLUSTER, DbClusterBuilder, NAMESPACE, PodBuilder, StatefulSetBuilder, healthy_member, image,
    revision,
};

/// What happened to one role in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundEvent {
    /// The reconcile returned Ok.
    Reconciled,
    /// The reconcile asked to be retried.
    Requeued(String),
}

/// Snapshot of a role after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSnapshot {
    pub phase: MemberPhase,
    pub partition: Option<i32>,
    pub live_image: String,
    /// Ordinals whose pod runs the update revision.
    pub upgraded: Vec<i32>,
}

/// Mock infrastructure for a multi-role cluster under upgrade.
pub struct MockDbCluster {
    /// Cluster resource as the operator sees it.
    pub cluster: DbCluster,
    /// Live StatefulSets keyed by role.
    pub sets: BTreeMap<Role, StatefulSet>,
    /// Pod cache shared with the upgraders.
    pub pods: InMemoryPodLister,
    /// Desired image per role.
    pub desired: BTreeMap<Role, String>,
    /// Metrics shared with the upgraders.
    pub metrics: Arc<UpgradeMetrics>,
    /// Per-round history of every role.
    pub history: Vec<BTreeMap<Role, RoleSnapshot>>,
}

impl MockDbCluster {
    /// A settled cluster running `v1` everywhere.
    pub fn running(roles: &[(Role, i32)]) -> Self {
        Self::running_from(roles, 0)
    }

    /// A settled cluster whose sets number their pods from `start`.
    pub fn running_from(roles: &[(Role, i32)], start: i32) -> Self {
        let mut builder = DbClusterBuilder::new(CLUSTER);
        for &(role, replicas) in roles {
            builder = builder.role(role, replicas);
        }
        let mut cluster = builder.build();

        let pods = InMemoryPodLister::new();
        let mut sets = BTreeMap::new();
        let mut desired = BTreeMap::new();
        for &(role, replicas) in roles {
            let mut set = StatefulSetBuilder::new(role).replicas(replicas);
            if start != 0 {
                set = set.ordinals_start(start);
            }
            let set = set.build();
            for ordinal in pod_ordinals(replicas, &set) {
                pods.insert(PodBuilder::new(role, ordinal).build());
                cluster
                    .role_status_mut(role)
                    .members
                    .insert(pod_name(CLUSTER, role, ordinal), healthy_member(role, ordinal));
            }
            sets.insert(role, set);
            desired.insert(role, image(role, "v1"));
        }

        Self {
            cluster,
            sets,
            pods,
            desired,
            metrics: Arc::new(UpgradeMetrics::new()),
            history: Vec::new(),
        }
    }

    /// Request a new version for a role.
    pub fn set_version(&mut self, role: Role, version: &str) {
        self.desired.insert(role, image(role, version));
    }

    /// Fresh upgrader for a role. Upgraders hold no state between calls.
    pub fn upgrader(&self, role: Role) -> RoleUpgrader {
        RoleUpgrader::new(
            role,
            UpgradeContext::new(Arc::new(self.pods.clone()), Some(self.metrics.clone())),
        )
    }

    /// The set the operator would generate: desired template, partition at
    /// the replica count so nothing rolls until the upgrader lowers it.
    fn desired_set(&self, role: Role) -> Option<StatefulSet> {
        let live = self.sets.get(&role)?;
        let mut set = live.clone();
        let replicas = live.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        let spec = set.spec.as_mut()?;
        if let Some(pod_spec) = spec.template.spec.as_mut()
            && let Some(container) = pod_spec.containers.first_mut()
        {
            container.image = self.desired.get(&role).cloned();
        }
        spec.update_strategy = Some(rolling_update_strategy(replicas));
        Some(set)
    }

    /// Run the operator's upgrade reconcile for one role and persist the result.
    pub fn reconcile(&mut self, role: Role) -> Result<(), Error> {
        let Some(old_set) = self.sets.get(&role).cloned() else {
            return Ok(());
        };
        let Some(mut new_set) = self.desired_set(role) else {
            return Ok(());
        };

        reconcile_role_upgrade(
            &self.upgrader(role),
            role,
            &mut self.cluster,
            &old_set,
            &mut new_set,
        )?;

        set_last_applied_config(&mut new_set)?;
        if new_set.spec != old_set.spec {
            let generation = old_set.metadata.generation.unwrap_or(0) + 1;
            new_set.metadata.generation = Some(generation);
        }
        new_set.status = old_set.status.clone();
        self.sets.insert(role, new_set);
        Ok(())
    }

    /// One StatefulSet controller step for a role.
    ///
    /// Observes the spec, brings up a replaced pod if one is still starting,
    /// otherwise replaces the highest pod at or above the partition that is
    /// not on the update revision.
    pub fn controller_step(&mut self, role: Role) {
        let Some(set) = self.sets.get(&role) else {
            return;
        };
        let live_image = live_image(set);
        let update_revision = revision(role, &live_image);
        let replicas = set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        let ordinals = pod_ordinals(replicas, set);
        let partition = current_partition(set);

        let mut starting = None;
        let mut stale = None;
        for &ordinal in ordinals.iter().rev() {
            let Ok(pod) = self.pods.get(NAMESPACE, &pod_name(CLUSTER, role, ordinal)) else {
                continue;
            };
            if !is_pod_ready(&pod) && starting.is_none() {
                starting = Some((ordinal, pod.metadata.labels.clone()));
            }
            let in_range = partition.is_some_and(|p| partition_for_ordinal(ordinal, set) >= p);
            if in_range && pod_revision(&pod) != Some(update_revision.as_str()) {
                stale = stale.or(Some(ordinal));
            }
        }

        let version = live_image.rsplit(':').next().unwrap_or_default().to_string();
        if let Some((ordinal, labels)) = starting {
            // Comes up on whatever revision it was created with
            let mut pod = PodBuilder::new(role, ordinal).build();
            pod.metadata.labels = labels;
            self.pods.insert(pod);
            self.cluster
                .role_status_mut(role)
                .members
                .insert(pod_name(CLUSTER, role, ordinal), healthy_member(role, ordinal));
        } else if let Some(ordinal) = stale {
            self.pods.insert(
                PodBuilder::new(role, ordinal)
                    .version(&version)
                    .ready(false)
                    .build(),
            );
            if let Some(member) = self
                .cluster
                .role_status_mut(role)
                .members
                .get_mut(&pod_name(CLUSTER, role, ordinal))
            {
                member.health = false;
            }
        }

        let upgraded = ordinals
            .iter()
            .filter(|&&o| self.pod_on_revision(role, o, &update_revision))
            .count();
        let all_upgraded = upgraded == ordinals.len();

        let Some(set) = self.sets.get_mut(&role) else {
            return;
        };
        let generation = set.metadata.generation;
        if let Some(status) = set.status.as_mut() {
            status.observed_generation = generation;
            status.update_revision = Some(update_revision.clone());
            status.updated_replicas = i32::try_from(upgraded).ok();
            if all_upgraded {
                status.current_revision = Some(update_revision);
            }
        }
    }

    /// Switch the live set to `OnDelete`, as a user editing it by hand would.
    pub fn edit_strategy_on_delete(&mut self, role: Role) {
        if let Some(spec) = self.sets.get_mut(&role).and_then(|s| s.spec.as_mut()) {
            spec.update_strategy = Some(StatefulSetUpdateStrategy {
                type_: Some(ON_DELETE.to_string()),
                rolling_update: None,
            });
        }
    }

    /// Delete a pod by hand; it comes back ready on the live template.
    pub fn delete_pod(&mut self, role: Role, ordinal: i32) {
        let version = self
            .sets
            .get(&role)
            .map(live_image)
            .and_then(|image| image.rsplit(':').next().map(str::to_string))
            .unwrap_or_default();
        self.pods
            .insert(PodBuilder::new(role, ordinal).version(&version).build());
    }

    /// Mark the member behind a pod unhealthy.
    pub fn fail_member(&mut self, role: Role, ordinal: i32) {
        if let Some(member) = self
            .cluster
            .role_status_mut(role)
            .members
            .get_mut(&pod_name(CLUSTER, role, ordinal))
        {
            member.health = false;
        }
    }

    /// Mark the member behind a pod healthy again.
    pub fn heal_member(&mut self, role: Role, ordinal: i32) {
        self.cluster
            .role_status_mut(role)
            .members
            .insert(pod_name(CLUSTER, role, ordinal), healthy_member(role, ordinal));
    }

    /// Reload the cluster resource from its serialized form, as after an
    /// operator restart. Only what is persisted in the resource survives.
    pub fn restart_operator(&mut self) {
        let json = serde_json::to_value(&self.cluster).expect("cluster serializes");
        self.cluster = serde_json::from_value(json).expect("cluster deserializes");
    }

    fn pod_on_revision(&self, role: Role, ordinal: i32, revision: &str) -> bool {
        self.pods
            .get(NAMESPACE, &pod_name(CLUSTER, role, ordinal))
            .is_ok_and(|pod| pod_revision(&pod) == Some(revision))
    }

    /// Reconcile every deployed role, then step every StatefulSet.
    pub fn round(&mut self) -> BTreeMap<Role, RoundEvent> {
        let roles: Vec<Role> = self.sets.keys().copied().collect();
        let mut events = BTreeMap::new();
        for role in Role::ALL.into_iter().filter(|r| roles.contains(r)) {
            let event = match self.reconcile(role) {
                Ok(()) => RoundEvent::Reconciled,
                Err(e) if e.is_retryable() => RoundEvent::Requeued(e.to_string()),
                Err(e) => panic!("{role} reconcile failed: {e}"),
            };
            events.insert(role, event);
        }
        for role in &roles {
            self.controller_step(*role);
        }
        let snapshot = roles.iter().map(|&r| (r, self.snapshot(r))).collect();
        self.history.push(snapshot);
        events
    }

    /// Run rounds until every role is Normal on its desired image.
    ///
    /// Returns the number of rounds taken.
    pub fn run_until_settled(&mut self, max_rounds: usize) -> usize {
        for round in 1..=max_rounds {
            self.round();
            if self.is_settled() {
                return round;
            }
        }
        panic!("cluster did not settle in {max_rounds} rounds");
    }

    /// Whether every role is Normal with all pods on the desired image.
    pub fn is_settled(&self) -> bool {
        self.sets.keys().all(|&role| {
            let snapshot = self.snapshot(role);
            snapshot.phase == MemberPhase::Normal
                && self.desired.get(&role) == Some(&snapshot.live_image)
                && snapshot.upgraded.len() == self.ordinals(role).len()
        })
    }

    fn ordinals(&self, role: Role) -> Vec<i32> {
        self.sets
            .get(&role)
            .map(|set| {
                let replicas = set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
                pod_ordinals(replicas, set).into_iter().collect()
            })
            .unwrap_or_default()
    }

    /// Current state of a role.
    pub fn snapshot(&self, role: Role) -> RoleSnapshot {
        let set = self.sets.get(&role);
        let live_image = set.map(live_image).unwrap_or_default();
        let update_revision = revision(role, &live_image);
        RoleSnapshot {
            phase: self.cluster.role_phase(role),
            partition: set.and_then(current_partition),
            upgraded: self
                .ordinals(role)
                .into_iter()
                .filter(|&o| self.pod_on_revision(role, o, &update_revision))
                .collect(),
            live_image,
        }
    }

    /// Number of pods per role that are replaced but not yet ready.
    pub fn pods_in_flight(&self, role: Role) -> usize {
        self.ordinals(role)
            .into_iter()
            .filter(|&o| {
                self.pods
                    .get(NAMESPACE, &pod_name(CLUSTER, role, o))
                    .is_ok_and(|pod| !is_pod_ready(&pod))
            })
            .count()
    }
}

fn live_image(set: &StatefulSet) -> String {
    set.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}
