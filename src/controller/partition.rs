//! Rolling-update partition helpers.
//!
//! The StatefulSet controller only replaces pods whose position (ordinal
//! minus `ordinals.start`) is at or above the partition. The upgrader moves
//! the partition down one position at a time to release pods individually.

use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetUpdateStrategy,
};

/// `updateStrategy.type` value for rolling updates.
pub const ROLLING_UPDATE: &str = "RollingUpdate";

/// `updateStrategy.type` value for manual, delete-driven updates.
pub const ON_DELETE: &str = "OnDelete";

/// A rolling-update strategy holding every ordinal below `partition`.
pub fn rolling_update_strategy(partition: i32) -> StatefulSetUpdateStrategy {
    StatefulSetUpdateStrategy {
        type_: Some(ROLLING_UPDATE.to_string()),
        rolling_update: Some(RollingUpdateStatefulSetStrategy {
            partition: Some(partition),
            max_unavailable: None,
        }),
    }
}

/// Set the rolling-update partition of `set`.
///
/// Replaces the rolling-update parameters. Does nothing if the set has no spec.
pub fn set_upgrade_partition(set: &mut StatefulSet, partition: i32) {
    if let Some(spec) = set.spec.as_mut() {
        let strategy = spec.update_strategy.get_or_insert_with(Default::default);
        strategy.rolling_update = Some(RollingUpdateStatefulSetStrategy {
            partition: Some(partition),
            max_unavailable: None,
        });
    }
}

/// The effective partition of a rolling-update set.
///
/// `None` when the set is not partitioned by the operator (see
/// [`is_manual_bypass`]). An unset partition is 0, as the API server treats it.
pub fn current_partition(set: &StatefulSet) -> Option<i32> {
    let strategy = set.spec.as_ref()?.update_strategy.as_ref();
    if is_manual_bypass(strategy) {
        return None;
    }
    strategy
        .and_then(|s| s.rolling_update.as_ref())
        .map(|r| r.partition.unwrap_or(0))
}

/// Whether an update strategy hands pod replacement to someone else.
///
/// True for `OnDelete` and for rolling updates without parameters, which
/// the operator has no partition to drive.
pub fn is_manual_bypass(strategy: Option<&StatefulSetUpdateStrategy>) -> bool {
    let Some(strategy) = strategy else {
        return true;
    };
    strategy.type_.as_deref() == Some(ON_DELETE) || strategy.rolling_update.is_none()
}
