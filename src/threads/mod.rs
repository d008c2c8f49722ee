//! Thread management for a cluster node.
//!
//! This module provides two threads:
//! - `CoordinatorThread`: Single-owner actor driving one task's coordinator
//! - `PlannerThread`: Collects summaries of all tasks and broadcasts assignments
//!
//! Both poll a shared `running` flag and exit when it is cleared or when
//! every sender of their input channels is gone.

mod coordinator_thread;
mod planner_thread;

pub use coordinator_thread::CoordinatorThread;
pub use planner_thread::PlannerThread;

use std::time::Duration;

/// How long an idle actor waits before re-checking the running flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
