//! Resampling orchestration layer.
//!
//! This layer drives one task through the distributed resampling cycle.
//!
//! # Contents
//!
//! - [`matcher`]: Local scan-matching contract consumed by the coordinator
//! - [`planner`]: Global assignment-planning contract and a low-variance reference
//! - [`dispatch`]: Bounded worker pool for outbound map batches
//! - [`coordinator`]: The per-task resampling state machine

pub mod coordinator;
pub mod dispatch;
pub mod matcher;
pub mod planner;

pub use coordinator::{
    CoordinatorConfig, CoordinatorError, CoordinatorStats, MatchState, ResamplingCoordinator,
};
pub use dispatch::{DispatchError, DispatchPool, OutboundBatch};
pub use matcher::{LocalScanMatcher, MatchOutcome};
pub use planner::{
    AssignmentPlanner, LowVariancePlanner, LowVariancePlannerConfig, values_for_assignments,
};
