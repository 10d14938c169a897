//! DbCluster Custom Resource Definition.
//!
//! Describes a multi-role database cluster. Every role (coordinator, storage,
//! gateway, change-data-capture, auxiliary) runs as its own StatefulSet and
//! reports its lifecycle phase and member health under `status`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSetStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DbCluster is a custom resource for deploying a multi-role database cluster.
///
/// Example:
/// ```yaml
/// apiVersion: dbcluster-operator.smoketurner.com/v1alpha1
/// kind: DbCluster
/// metadata:
///   name: basic
/// spec:
///   coordinator:
///     replicas: 3
///   storage:
///     replicas: 3
///   gateway:
///     replicas: 2
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "dbcluster-operator.smoketurner.com",
    version = "v1alpha1",
    kind = "DbCluster",
    plural = "dbclusters",
    shortname = "dbc",
    status = "DbClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Coordinator", "type":"string", "jsonPath":".status.coordinator.phase"}"#,
    printcolumn = r#"{"name":"Storage", "type":"string", "jsonPath":".status.storage.phase"}"#,
    printcolumn = r#"{"name":"Gateway", "type":"string", "jsonPath":".status.gateway.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterSpec {
    /// Coordinator (placement driver) nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<ComponentSpec>,

    /// Storage nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<ComponentSpec>,

    /// SQL gateway nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<ComponentSpec>,

    /// Change-data-capture source nodes (binlog producers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdc_source: Option<ComponentSpec>,

    /// Change-data-capture sink nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdc_sink: Option<ComponentSpec>,

    /// Auxiliary monitor nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_monitor: Option<ComponentSpec>,

    /// Overrides the default upgrade ordering.
    ///
    /// Maps a role to the roles that must not be upgrading or scaling while it
    /// upgrades. Roles missing from the map keep their default blockers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_order: Option<BTreeMap<Role, Vec<Role>>>,
}

/// Per-role deployment settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Desired number of pods for this role.
    #[serde(default)]
    pub replicas: i32,

    /// Container image override for this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A distinct class of node in the database cluster.
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Placement/metadata coordinators. Quorum-bearing.
    Coordinator,
    /// Data-bearing storage nodes.
    Storage,
    /// Stateless SQL gateways.
    Gateway,
    /// Change-data-capture producers.
    CdcSource,
    /// Change-data-capture consumers.
    CdcSink,
    /// Auxiliary monitor nodes.
    AuxiliaryMonitor,
}

impl Role {
    /// Every role, in default upgrade order.
    pub const ALL: [Role; 6] = [
        Role::Coordinator,
        Role::Storage,
        Role::CdcSource,
        Role::Gateway,
        Role::CdcSink,
        Role::AuxiliaryMonitor,
    ];

    /// Stable lowercase identifier used in resource names and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Storage => "storage",
            Role::Gateway => "gateway",
            Role::CdcSource => "cdc-source",
            Role::CdcSink => "cdc-sink",
            Role::AuxiliaryMonitor => "auxiliary-monitor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a DbCluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DbClusterStatus {
    /// Coordinator role status.
    #[serde(default)]
    pub coordinator: RoleStatus,

    /// Storage role status.
    #[serde(default)]
    pub storage: RoleStatus,

    /// Gateway role status.
    #[serde(default)]
    pub gateway: RoleStatus,

    /// CDC source role status.
    #[serde(default)]
    pub cdc_source: RoleStatus,

    /// CDC sink role status.
    #[serde(default)]
    pub cdc_sink: RoleStatus,

    /// Auxiliary monitor role status.
    #[serde(default)]
    pub auxiliary_monitor: RoleStatus,

    /// The generation most recently observed by the controller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl DbClusterStatus {
    /// Status of a single role.
    pub fn role(&self, role: Role) -> &RoleStatus {
        match role {
            Role::Coordinator => &self.coordinator,
            Role::Storage => &self.storage,
            Role::Gateway => &self.gateway,
            Role::CdcSource => &self.cdc_source,
            Role::CdcSink => &self.cdc_sink,
            Role::AuxiliaryMonitor => &self.auxiliary_monitor,
        }
    }

    /// Mutable status of a single role.
    pub fn role_mut(&mut self, role: Role) -> &mut RoleStatus {
        match role {
            Role::Coordinator => &mut self.coordinator,
            Role::Storage => &mut self.storage,
            Role::Gateway => &mut self.gateway,
            Role::CdcSource => &mut self.cdc_source,
            Role::CdcSink => &mut self.cdc_sink,
            Role::AuxiliaryMonitor => &mut self.auxiliary_monitor,
        }
    }
}

/// Observed status of one role.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleStatus {
    /// Lifecycle phase of the role.
    #[serde(default)]
    pub phase: MemberPhase,

    /// Revision status copied from the role's StatefulSet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_set: Option<StatefulSetRevisionStatus>,

    /// Database-reported member status keyed by pod name.
    #[serde(default)]
    pub members: BTreeMap<String, MemberStatus>,
}

/// Phase of a single role.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum MemberPhase {
    /// Steady state.
    #[default]
    Normal,
    /// Pods are being added.
    ScaleOut,
    /// Pods are being removed.
    ScaleIn,
    /// A rolling upgrade is in progress.
    Upgrade,
}

impl MemberPhase {
    /// Whether the role is being resized in either direction.
    pub fn is_scaling(&self) -> bool {
        matches!(self, MemberPhase::ScaleOut | MemberPhase::ScaleIn)
    }
}

impl std::fmt::Display for MemberPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberPhase::Normal => write!(f, "Normal"),
            MemberPhase::ScaleOut => write!(f, "ScaleOut"),
            MemberPhase::ScaleIn => write!(f, "ScaleIn"),
            MemberPhase::Upgrade => write!(f, "Upgrade"),
        }
    }
}

/// Database-level status of one member.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    /// Member name as reported by the database.
    #[serde(default)]
    pub name: String,

    /// Database-internal member identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Whether the database considers this member healthy.
    #[serde(default)]
    pub health: bool,

    /// Store state, for roles that report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<MemberState>,

    /// Whether this member currently holds leadership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<bool>,

    /// Last time `health` or `state` changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Store state reported for storage-like members.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum MemberState {
    /// Serving.
    Up,
    /// Draining before removal.
    Offline,
    /// Unreachable.
    Down,
    /// Removed.
    Tombstone,
}

impl std::fmt::Display for MemberState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberState::Up => write!(f, "Up"),
            MemberState::Offline => write!(f, "Offline"),
            MemberState::Down => write!(f, "Down"),
            MemberState::Tombstone => write!(f, "Tombstone"),
        }
    }
}

/// Revision-related fields of a StatefulSet status.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetRevisionStatus {
    /// Revision of the pods below the partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_revision: Option<String>,

    /// Revision of the desired pod template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_revision: Option<String>,

    /// Number of pods created by the StatefulSet controller.
    #[serde(default)]
    pub replicas: i32,

    /// Number of pods on `update_revision`.
    #[serde(default)]
    pub updated_replicas: i32,

    /// Number of ready pods.
    #[serde(default)]
    pub ready_replicas: i32,

    /// Generation observed by the StatefulSet controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl StatefulSetRevisionStatus {
    /// True once every pod runs the update revision.
    pub fn revisions_converged(&self) -> bool {
        self.update_revision == self.current_revision
    }
}

impl From<&StatefulSetStatus> for StatefulSetRevisionStatus {
    fn from(status: &StatefulSetStatus) -> Self {
        Self {
            current_revision: status.current_revision.clone(),
            update_revision: status.update_revision.clone(),
            replicas: status.replicas,
            updated_replicas: status.updated_replicas.unwrap_or(0),
            ready_replicas: status.ready_replicas.unwrap_or(0),
            observed_generation: status.observed_generation,
        }
    }
}

impl DbCluster {
    /// Spec of a single role, if the role is deployed.
    pub fn component(&self, role: Role) -> Option<&ComponentSpec> {
        match role {
            Role::Coordinator => self.spec.coordinator.as_ref(),
            Role::Storage => self.spec.storage.as_ref(),
            Role::Gateway => self.spec.gateway.as_ref(),
            Role::CdcSource => self.spec.cdc_source.as_ref(),
            Role::CdcSink => self.spec.cdc_sink.as_ref(),
            Role::AuxiliaryMonitor => self.spec.auxiliary_monitor.as_ref(),
        }
    }

    /// Desired replica count for a role (0 when the role is not deployed).
    pub fn desired_replicas(&self, role: Role) -> i32 {
        self.component(role).map_or(0, |c| c.replicas)
    }

    /// Current phase of a role, `Normal` when no status has been written yet.
    pub fn role_phase(&self, role: Role) -> MemberPhase {
        self.status
            .as_ref()
            .map_or(MemberPhase::Normal, |s| s.role(role).phase)
    }

    /// Status of a role, if any status has been written.
    pub fn role_status(&self, role: Role) -> Option<&RoleStatus> {
        self.status.as_ref().map(|s| s.role(role))
    }

    /// Mutable status of a role, creating an empty status if needed.
    pub fn role_status_mut(&mut self, role: Role) -> &mut RoleStatus {
        self.status
            .get_or_insert_with(DbClusterStatus::default)
            .role_mut(role)
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create an "Upgrading" condition.
    pub fn upgrading(upgrading: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new(UPGRADING_CONDITION, upgrading, reason, message, generation)
    }
}

/// Condition type set while any role is in the `Upgrade` phase.
pub const UPGRADING_CONDITION: &str = "Upgrading";
