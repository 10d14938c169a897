//! Revision tracking for role StatefulSets.
//!
//! Two kinds of revision information are used by the upgrader:
//! - the `controller-revision-hash` label the StatefulSet controller stamps on
//!   every pod, compared against the set's update revision, and
//! - the last-applied configuration the operator records as annotations when
//!   it writes a StatefulSet, used to restore a template while an upgrade is
//!   deferred and as the baseline for template comparison.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use kube::ResourceExt;

use crate::controller::error::{Error, Result};

/// Pod label carrying the StatefulSet controller revision.
pub const CONTROLLER_REVISION_HASH_LABEL: &str = "controller-revision-hash";

/// Annotation holding the JSON of the last spec (or pod spec) the operator applied.
///
/// Set on the StatefulSet itself (full spec) and on its pod template (pod spec).
pub const LAST_APPLIED_CONFIG_ANNOTATION: &str =
    "dbcluster-operator.smoketurner.com/last-applied-configuration";

/// Revision label of a pod, if present.
pub fn pod_revision(pod: &Pod) -> Option<&str> {
    pod.labels()
        .get(CONTROLLER_REVISION_HASH_LABEL)
        .map(String::as_str)
}

/// Recover the last spec and pod spec the operator applied to a StatefulSet.
pub fn last_applied_config(set: &StatefulSet) -> Result<(StatefulSetSpec, PodSpec)> {
    let set_name = set_display_name(set);

    let spec_json = set
        .annotations()
        .get(LAST_APPLIED_CONFIG_ANNOTATION)
        .ok_or_else(|| {
            Error::LastAppliedConfig(format!(
                "statefulset {set_name} has no last applied spec"
            ))
        })?;
    let spec: StatefulSetSpec = serde_json::from_str(spec_json)?;

    let pod_spec_json = last_applied_pod_spec_json(set).ok_or_else(|| {
        Error::LastAppliedConfig(format!(
            "statefulset {set_name} pod template has no last applied pod spec"
        ))
    })?;
    let pod_spec: PodSpec = serde_json::from_str(pod_spec_json)?;

    Ok((spec, pod_spec))
}

/// Raw last-applied pod spec JSON from the pod template annotations.
pub(crate) fn last_applied_pod_spec_json(set: &StatefulSet) -> Option<&str> {
    set.spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(LAST_APPLIED_CONFIG_ANNOTATION)
        .map(String::as_str)
}

/// Record the current spec and pod spec as last-applied annotations.
///
/// Called on a StatefulSet right before the operator persists it. The pod
/// spec annotation is written first so that the recorded set spec includes it.
pub fn set_last_applied_config(set: &mut StatefulSet) -> Result<()> {
    let Some(spec) = set.spec.as_mut() else {
        return Err(Error::LastAppliedConfig(format!(
            "statefulset {} has no spec",
            set.name_any()
        )));
    };

    let pod_spec_json = serde_json::to_string(&spec.template.spec.clone().unwrap_or_default())?;
    spec.template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), pod_spec_json);

    let spec_json = serde_json::to_string(&*spec)?;
    set.annotations_mut()
        .insert(LAST_APPLIED_CONFIG_ANNOTATION.to_string(), spec_json);
    Ok(())
}

/// Whether the StatefulSet controller is still rolling pods.
///
/// True when the revisions differ, or when a spec change has not been
/// observed yet while the replica count is already settled.
pub fn statefulset_is_upgrading(set: &StatefulSet) -> bool {
    let Some(status) = set.status.as_ref() else {
        return false;
    };
    if status.current_revision != status.update_revision {
        return true;
    }
    let desired = set.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let generation = set.metadata.generation.unwrap_or(0);
    let observed = status.observed_generation.unwrap_or(0);
    generation > observed && desired == status.replicas
}

fn set_display_name(set: &StatefulSet) -> String {
    format!(
        "{}/{}",
        set.namespace().unwrap_or_default(),
        set.name_any()
    )
}
