//! Health gate for upgraded pods.
//!
//! A pod on the update revision counts as done only when Kubernetes reports
//! it Ready and the database reports the member healthy. Either check alone
//! is not enough: a Ready pod may not have rejoined the cluster yet.

use k8s_openapi::api::core::v1::Pod;

use crate::controller::error::{Error, Result};
use crate::crd::{MemberState, MemberStatus, Role, RoleStatus};

/// Whether the pod's `Ready` condition is `True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True")
}

/// What the database must report before a member counts as healthy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberHealthCheck {
    /// `health` is true.
    Healthy,
    /// `health` is true and the store state is `Up`.
    HealthyAndUp,
}

impl MemberHealthCheck {
    /// Check used for a role. Store-bearing roles also need to be `Up`.
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Storage | Role::CdcSource => MemberHealthCheck::HealthyAndUp,
            Role::Coordinator | Role::Gateway | Role::CdcSink | Role::AuxiliaryMonitor => {
                MemberHealthCheck::Healthy
            }
        }
    }

    /// Whether `member` passes this check.
    pub fn passes(&self, member: &MemberStatus) -> bool {
        match self {
            MemberHealthCheck::Healthy => member.health,
            MemberHealthCheck::HealthyAndUp => {
                member.health && member.state == Some(MemberState::Up)
            }
        }
    }
}

/// Gate an already-upgraded pod.
///
/// Returns `Error::Requeue` if the pod is not Ready, or if its member entry
/// is missing or fails `check`.
pub fn check_upgraded_pod(
    cluster: &str,
    pod: &Pod,
    pod_name: &str,
    status: Option<&RoleStatus>,
    check: MemberHealthCheck,
) -> Result<()> {
    if !is_pod_ready(pod) {
        return Err(Error::requeue(format!(
            "cluster {cluster}: upgraded pod {pod_name} is not ready"
        )));
    }

    match status.and_then(|s| s.members.get(pod_name)) {
        Some(member) if check.passes(member) => Ok(()),
        Some(_) => Err(Error::requeue(format!(
            "cluster {cluster}: upgraded pod {pod_name} is not healthy"
        ))),
        None => Err(Error::requeue(format!(
            "cluster {cluster}: upgraded pod {pod_name} has no member status"
        ))),
    }
}
