//! Controller module for dbcluster-operator.
//!
//! Contains the rolling upgrade core: the per-role upgraders, the helpers
//! they read cluster state through, and the reconciliation wrapper around
//! them.
//!
//! Leaf modules first:
//! - `revision`, `template`: last-applied configuration and template equality
//! - `ordinals`, `partition`: which pods exist and which may be replaced
//! - `pod_health`, `upgrade_order`: per-pod and cross-role gates
//! - `upgrader`: the step state machine
//! - `upgrade_manager`: phase bookkeeping around an upgrader

// Shared modules
pub mod context;
pub mod error;
pub mod pod_lister;
pub mod status;

// Upgrade building blocks
pub mod ordinals;
pub mod partition;
pub mod pod_health;
pub mod revision;
pub mod template;
pub mod upgrade_order;

// Upgrade controller
pub mod upgrade_manager;
pub mod upgrader;

pub use context::UpgradeContext;
pub use error::{Error, LookupError, Result};
pub use pod_lister::{InMemoryPodLister, PodLister, StorePodLister};
pub use upgrader::{FakeUpgrader, RoleUpgrader, UpgradeOutcome, Upgrader};
