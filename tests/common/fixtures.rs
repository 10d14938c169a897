//! Test fixtures and builder patterns for DbCluster, role StatefulSets and pods.

use std::collections::BTreeMap;

use dbcluster_operator::controller::ordinals::{DELETE_SLOTS_ANNOTATION, pod_name, statefulset_name};
use dbcluster_operator::controller::partition::{ON_DELETE, ROLLING_UPDATE, rolling_update_strategy};
use dbcluster_operator::controller::revision::{CONTROLLER_REVISION_HASH_LABEL, set_last_applied_config};
use dbcluster_operator::crd::{
    ComponentSpec, DbCluster, DbClusterSpec, MemberPhase, MemberState, MemberStatus, Role,
    StatefulSetRevisionStatus,
};
use dbcluster_operator::resources::role_labels;
use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetOrdinals, StatefulSetSpec, StatefulSetStatus,
    StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    Container, Pod, PodCondition, PodSpec, PodStatus, PodTemplateSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Namespace used by fixtures unless overridden.
pub const NAMESPACE: &str = "default";

/// Cluster name used by fixtures unless overridden.
pub const CLUSTER: &str = "basic";

/// Default image for a role.
pub fn image(role: Role, version: &str) -> String {
    format!("registry.local/{}:{}", role.as_str(), version)
}

/// Controller revision the StatefulSet controller would compute for an image.
pub fn revision(role: Role, image: &str) -> String {
    let tag = image.rsplit(':').next().unwrap_or("latest");
    format!("{}-{}", statefulset_name(CLUSTER, role), tag.replace('.', "-"))
}

/// Builder for creating DbCluster test fixtures.
///
/// # Example
/// ```
/// let cluster = DbClusterBuilder::new("basic")
///     .role(Role::Storage, 3)
///     .phase(Role::Storage, MemberPhase::Upgrade)
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct DbClusterBuilder {
    name: String,
    namespace: String,
    replicas: BTreeMap<Role, i32>,
    phases: BTreeMap<Role, MemberPhase>,
    upgrade_order: BTreeMap<Role, Vec<Role>>,
    generation: Option<i64>,
}

impl DbClusterBuilder {
    /// Create a new builder with the given cluster name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: NAMESPACE.to_string(),
            replicas: BTreeMap::new(),
            phases: BTreeMap::new(),
            upgrade_order: BTreeMap::new(),
            generation: Some(1),
        }
    }

    /// Set the namespace for the cluster.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Deploy a role with the given number of replicas.
    pub fn role(mut self, role: Role, replicas: i32) -> Self {
        self.replicas.insert(role, replicas);
        self
    }

    /// Deploy coordinator, storage and gateway with three replicas each.
    pub fn standard(self) -> Self {
        self.role(Role::Coordinator, 3)
            .role(Role::Storage, 3)
            .role(Role::Gateway, 3)
    }

    /// Set the phase of a role.
    pub fn phase(mut self, role: Role, phase: MemberPhase) -> Self {
        self.phases.insert(role, phase);
        self
    }

    /// Override the blockers of a role.
    pub fn upgrade_order(mut self, role: Role, blockers: Vec<Role>) -> Self {
        self.upgrade_order.insert(role, blockers);
        self
    }

    /// Set the generation.
    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Build the DbCluster.
    pub fn build(self) -> DbCluster {
        let component = |role: Role| {
            self.replicas.get(&role).map(|&replicas| ComponentSpec {
                replicas,
                image: None,
            })
        };
        let spec = DbClusterSpec {
            coordinator: component(Role::Coordinator),
            storage: component(Role::Storage),
            gateway: component(Role::Gateway),
            cdc_source: component(Role::CdcSource),
            cdc_sink: component(Role::CdcSink),
            auxiliary_monitor: component(Role::AuxiliaryMonitor),
            upgrade_order: if self.upgrade_order.is_empty() {
                None
            } else {
                Some(self.upgrade_order.clone())
            },
        };

        let mut cluster = DbCluster::new(&self.name, spec);
        cluster.metadata.namespace = Some(self.namespace.clone());
        cluster.metadata.generation = self.generation;
        cluster.metadata.uid = Some(format!("uid-{}", self.name));
        for (role, phase) in &self.phases {
            cluster.role_status_mut(*role).phase = *phase;
        }
        cluster
    }
}

/// Builder for the StatefulSet of one role.
#[derive(Clone, Debug)]
pub struct StatefulSetBuilder {
    role: Role,
    replicas: i32,
    image: String,
    strategy: Option<StatefulSetUpdateStrategy>,
    current_revision: Option<String>,
    update_revision: Option<String>,
    generation: i64,
    observed_generation: i64,
    ordinals_start: Option<i32>,
    delete_slots: Option<String>,
    applied: bool,
}

impl StatefulSetBuilder {
    /// Create a builder for a settled set running `v1`, partitioned at `replicas`.
    pub fn new(role: Role) -> Self {
        let image = image(role, "v1");
        let rev = revision(role, &image);
        Self {
            role,
            replicas: 3,
            image,
            strategy: Some(rolling_update_strategy(3)),
            current_revision: Some(rev.clone()),
            update_revision: Some(rev),
            generation: 1,
            observed_generation: 1,
            ordinals_start: None,
            delete_slots: None,
            applied: true,
        }
    }

    /// Set the replica count. Resets the partition to the new count.
    pub fn replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self.strategy = Some(rolling_update_strategy(replicas));
        self
    }

    /// Set the template image version.
    pub fn version(mut self, version: &str) -> Self {
        self.image = image(self.role, version);
        self
    }

    /// Set the rolling update partition.
    pub fn partition(mut self, partition: i32) -> Self {
        self.strategy = Some(rolling_update_strategy(partition));
        self
    }

    /// Switch to the `OnDelete` strategy.
    pub fn on_delete(mut self) -> Self {
        self.strategy = Some(StatefulSetUpdateStrategy {
            type_: Some(ON_DELETE.to_string()),
            rolling_update: None,
        });
        self
    }

    /// Rolling update without parameters.
    pub fn rolling_update_without_params(mut self) -> Self {
        self.strategy = Some(StatefulSetUpdateStrategy {
            type_: Some(ROLLING_UPDATE.to_string()),
            rolling_update: None,
        });
        self
    }

    /// Mid-upgrade status: pods move from `from` to `to`.
    pub fn rolling(mut self, from: &str, to: &str) -> Self {
        self.current_revision = Some(revision(self.role, &image(self.role, from)));
        self.update_revision = Some(revision(self.role, &image(self.role, to)));
        self
    }

    /// Set the first ordinal.
    pub fn ordinals_start(mut self, start: i32) -> Self {
        self.ordinals_start = Some(start);
        self
    }

    /// Set the raw delete-slots annotation.
    pub fn delete_slots(mut self, slots: &str) -> Self {
        self.delete_slots = Some(slots.to_string());
        self
    }

    /// Skip recording the last-applied annotations.
    pub fn unapplied(mut self) -> Self {
        self.applied = false;
        self
    }

    /// Build the StatefulSet.
    pub fn build(self) -> StatefulSet {
        let labels = role_labels(CLUSTER, self.role);
        let mut annotations = BTreeMap::new();
        if let Some(slots) = &self.delete_slots {
            annotations.insert(DELETE_SLOTS_ANNOTATION.to_string(), slots.clone());
        }

        let mut set = StatefulSet {
            metadata: ObjectMeta {
                name: Some(statefulset_name(CLUSTER, self.role)),
                namespace: Some(NAMESPACE.to_string()),
                generation: Some(self.generation),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                service_name: Some(format!("{}-peer", statefulset_name(CLUSTER, self.role))),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: self.role.as_str().to_string(),
                            image: Some(self.image.clone()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                update_strategy: self.strategy.clone(),
                ordinals: self.ordinals_start.map(|start| StatefulSetOrdinals {
                    start: Some(start),
                }),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                current_revision: self.current_revision.clone(),
                update_revision: self.update_revision.clone(),
                replicas: self.replicas,
                observed_generation: Some(self.observed_generation),
                ..Default::default()
            }),
        };
        if self.applied {
            set_last_applied_config(&mut set).expect("fixture set has a spec");
        }
        set
    }
}

/// Builder for a role pod.
#[derive(Clone, Debug)]
pub struct PodBuilder {
    role: Role,
    ordinal: i32,
    revision: Option<String>,
    ready: bool,
}

impl PodBuilder {
    /// A ready pod on the `v1` revision.
    pub fn new(role: Role, ordinal: i32) -> Self {
        Self {
            role,
            ordinal,
            revision: Some(revision(role, &image(role, "v1"))),
            ready: true,
        }
    }

    /// Set the image version the pod runs.
    pub fn version(mut self, version: &str) -> Self {
        self.revision = Some(revision(self.role, &image(self.role, version)));
        self
    }

    /// Drop the revision label.
    pub fn without_revision(mut self) -> Self {
        self.revision = None;
        self
    }

    /// Set pod readiness.
    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    /// Build the Pod.
    pub fn build(self) -> Pod {
        let mut labels = role_labels(CLUSTER, self.role);
        if let Some(revision) = self.revision {
            labels.insert(CONTROLLER_REVISION_HASH_LABEL.to_string(), revision);
        }
        Pod {
            metadata: ObjectMeta {
                name: Some(pod_name(CLUSTER, self.role, self.ordinal)),
                namespace: Some(NAMESPACE.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: if self.ready { "True" } else { "False" }.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// A member entry that passes every health check.
pub fn healthy_member(role: Role, ordinal: i32) -> MemberStatus {
    MemberStatus {
        name: pod_name(CLUSTER, role, ordinal),
        id: Some(format!("{}", 1000 + ordinal)),
        health: true,
        state: Some(MemberState::Up),
        leader: None,
        last_transition_time: None,
    }
}

/// Record healthy members for the given ordinals of a role.
pub fn mark_members_healthy(cluster: &mut DbCluster, role: Role, ordinals: impl IntoIterator<Item = i32>) {
    for ordinal in ordinals {
        cluster
            .role_status_mut(role)
            .members
            .insert(pod_name(CLUSTER, role, ordinal), healthy_member(role, ordinal));
    }
}

/// Copy the revision status of a set into the role status.
pub fn observe(cluster: &mut DbCluster, role: Role, set: &StatefulSet) {
    cluster.role_status_mut(role).stateful_set =
        set.status.as_ref().map(StatefulSetRevisionStatus::from);
}

/// Create a cluster with standard roles for upgrade tests.
pub fn standard_cluster() -> DbCluster {
    DbClusterBuilder::new(CLUSTER).standard().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cluster = DbClusterBuilder::new("test").build();
        assert_eq!(cluster.metadata.name, Some("test".to_string()));
        assert_eq!(cluster.desired_replicas(Role::Storage), 0);
    }

    #[test]
    fn test_builder_with_options() {
        let cluster = DbClusterBuilder::new("test")
            .namespace("my-ns")
            .role(Role::Gateway, 2)
            .phase(Role::Gateway, MemberPhase::ScaleOut)
            .build();

        assert_eq!(cluster.metadata.namespace, Some("my-ns".to_string()));
        assert_eq!(cluster.desired_replicas(Role::Gateway), 2);
        assert_eq!(cluster.role_phase(Role::Gateway), MemberPhase::ScaleOut);
    }

    #[test]
    fn test_revision_is_stable_per_version() {
        let v1 = image(Role::Storage, "v1");
        assert_eq!(revision(Role::Storage, &v1), "basic-storage-v1");
        assert_ne!(
            revision(Role::Storage, &v1),
            revision(Role::Storage, &image(Role::Storage, "v2"))
        );
    }
}
