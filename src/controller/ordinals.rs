//! Pod ordinal enumeration and naming.
//!
//! Ordinals are recomputed from the replica count on every call. Two
//! StatefulSet features shift them away from the plain `0..replicas` range:
//! `spec.ordinals.start`, and the `delete-slots` annotation used by advanced
//! StatefulSets to skip specific ordinals while keeping the replica count.

use std::collections::BTreeSet;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::warn;

use crate::crd::Role;

/// Annotation listing ordinals that must not hold a pod, as a JSON array.
pub const DELETE_SLOTS_ANNOTATION: &str = "delete-slots";

/// Name of the StatefulSet backing a role.
pub fn statefulset_name(cluster: &str, role: Role) -> String {
    format!("{}-{}", cluster, role.as_str())
}

/// Name of the pod holding `ordinal` in a role's StatefulSet.
pub fn pod_name(cluster: &str, role: Role, ordinal: i32) -> String {
    format!("{}-{}", statefulset_name(cluster, role), ordinal)
}

/// Ordinals that hold a pod when the set runs `replicas` pods.
///
/// Every delete slot that falls inside the live range pushes the range end
/// up by one, so the set still ends up with `replicas` pods.
pub fn pod_ordinals(replicas: i32, set: &StatefulSet) -> BTreeSet<i32> {
    let replicas = replicas.max(0);
    let start = ordinals_start(set);

    let mut end = start.saturating_add(replicas);
    let mut skipped = BTreeSet::new();
    for slot in delete_slots(set) {
        if slot >= start && slot < end {
            skipped.insert(slot);
            end = end.saturating_add(1);
        }
    }

    (start..end).filter(|o| !skipped.contains(o)).collect()
}

/// First ordinal of the set, `spec.ordinals.start` or 0.
pub fn ordinals_start(set: &StatefulSet) -> i32 {
    set.spec
        .as_ref()
        .and_then(|s| s.ordinals.as_ref())
        .and_then(|o| o.start)
        .unwrap_or(0)
}

/// Partition value that releases `ordinal` and every ordinal above it.
///
/// The StatefulSet controller measures the partition from `ordinals.start`,
/// not from zero.
pub fn partition_for_ordinal(ordinal: i32, set: &StatefulSet) -> i32 {
    ordinal.saturating_sub(ordinals_start(set))
}

/// Delete slots recorded on the set, ascending. Malformed values are ignored.
fn delete_slots(set: &StatefulSet) -> BTreeSet<i32> {
    let Some(raw) = set.annotations().get(DELETE_SLOTS_ANNOTATION) else {
        return BTreeSet::new();
    };
    match serde_json::from_str::<BTreeSet<i32>>(raw) {
        Ok(slots) => slots,
        Err(e) => {
            warn!(
                statefulset = %set.name_any(),
                value = %raw,
                error = %e,
                "Ignoring malformed delete-slots annotation"
            );
            BTreeSet::new()
        }
    }
}
