//! Resource metadata helpers.
//!
//! The operator's StatefulSet write path lives outside this crate; what is
//! kept here is the metadata both sides agree on, so that the pod cache and
//! the generated objects select the same pods.

pub mod common;

pub use common::{pod_selector, role_labels};
