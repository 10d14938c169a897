//! Pod template comparison.
//!
//! Decides whether the desired template of a role StatefulSet matches what is
//! already applied. The baseline is the pod spec the operator recorded in the
//! last-applied annotation rather than the live template, because the live
//! template carries defaults injected by the API server that the operator never
//! wrote.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use tracing::error;

use crate::controller::revision::{LAST_APPLIED_CONFIG_ANNOTATION, last_applied_pod_spec_json};

/// Whether `new_set`'s pod template is structurally equal to `old_set`'s.
///
/// Compares the pod spec and the template labels and annotations. When the
/// last-applied pod spec on `old_set` cannot be decoded the templates are
/// reported as different, which holds the upgrade instead of acting on a
/// template that may not have been accepted.
pub fn template_equal(new_set: &StatefulSet, old_set: &StatefulSet) -> bool {
    let (Some(new_template), Some(old_template)) = (template(new_set), template(old_set)) else {
        return false;
    };

    let old_pod_spec = match last_applied_pod_spec_json(old_set) {
        Some(json) => match serde_json::from_str::<PodSpec>(json) {
            Ok(spec) => Some(spec),
            Err(e) => {
                error!(
                    statefulset = ?old_set.metadata.name,
                    error = %e,
                    "Failed to decode last applied pod spec"
                );
                return false;
            }
        },
        None => old_template.spec.clone(),
    };

    new_template.spec == old_pod_spec
        && template_labels(new_template) == template_labels(old_template)
        && template_annotations(new_template) == template_annotations(old_template)
}

fn template(set: &StatefulSet) -> Option<&PodTemplateSpec> {
    set.spec.as_ref().map(|s| &s.template)
}

fn template_labels(template: &PodTemplateSpec) -> BTreeMap<String, String> {
    template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default()
}

/// Template annotations without the operator's own bookkeeping annotation.
fn template_annotations(template: &PodTemplateSpec) -> BTreeMap<String, String> {
    let mut annotations = template
        .metadata
        .as_ref()
        .and_then(|m| m.annotations.clone())
        .unwrap_or_default();
    annotations.remove(LAST_APPLIED_CONFIG_ANNOTATION);
    annotations
}
