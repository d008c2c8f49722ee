//! Local simulation: synthetic scans, a reference matcher and an in-process
//! cluster that wires every task and the planner through a [`LocalHub`].
//!
//! [`LocalHub`]: crate::io::LocalHub

pub mod cluster;
pub mod jitter_matcher;
pub mod scan_source;

pub use cluster::{ClusterError, ClusterSummary, CycleReport, LocalCluster, LocalClusterConfig};
pub use jitter_matcher::{JitterMatcher, JitterMatcherConfig};
pub use scan_source::{ScanSourceConfig, SyntheticScanSource};
