//! Common labels for role resources.

use std::collections::BTreeMap;

use crate::controller::context::FIELD_MANAGER;
use crate::crd::Role;

/// `app.kubernetes.io/name` value shared by every managed resource
pub const APP_NAME: &str = "dbcluster";

/// Label keys applied to role pods
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Standard labels for the pods of one role
pub fn role_labels(cluster: &str, role: Role) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(NAME_LABEL.to_string(), APP_NAME.to_string());
    labels.insert(INSTANCE_LABEL.to_string(), cluster.to_string());
    labels.insert(COMPONENT_LABEL.to_string(), role.as_str().to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());
    labels
}

/// Label selector matching pods managed by the operator.
///
/// Narrowed to one cluster when `cluster` is set.
pub fn pod_selector(cluster: Option<&str>) -> String {
    let mut selector = format!("{NAME_LABEL}={APP_NAME},{MANAGED_BY_LABEL}={FIELD_MANAGER}");
    if let Some(cluster) = cluster {
        selector.push_str(&format!(",{INSTANCE_LABEL}={cluster}"));
    }
    selector
}
