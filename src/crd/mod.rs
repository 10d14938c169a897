//! Custom Resource Definitions (CRDs) for dbcluster-operator.
//!
//! - `DbCluster`: per-role specs plus the per-role phase and member health
//!   that the upgrade core reads and writes.

mod db_cluster;

pub use db_cluster::*;
