//! Deterministic split of particle indices across tasks.
//!
//! Every task computes the same split from `(total, tasks)` alone, so no
//! coordination is needed at startup.

use std::ops::Range;

use thiserror::Error;

/// Partition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("task count must be positive")]
    NoTasks,

    #[error("task {task} out of range for {tasks} tasks")]
    TaskOutOfRange { task: u32, tasks: u32 },
}

/// Contiguous split of `total` indices over `tasks` tasks.
///
/// Task `i` holds `total / tasks + 1` particles if `i < total % tasks`,
/// otherwise `total / tasks`. Offsets are prefix sums of those counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    total: u32,
    tasks: u32,
}

impl Partition {
    /// Create a partition. Fails when `tasks` is zero.
    pub fn new(total: u32, tasks: u32) -> Result<Self, PartitionError> {
        if tasks == 0 {
            return Err(PartitionError::NoTasks);
        }
        Ok(Self { total, tasks })
    }

    /// Total particle count.
    #[inline]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Number of tasks.
    #[inline]
    pub fn tasks(&self) -> u32 {
        self.tasks
    }

    /// Fail unless `task` is a valid task id.
    pub fn check_task(&self, task: u32) -> Result<(), PartitionError> {
        if task >= self.tasks {
            return Err(PartitionError::TaskOutOfRange {
                task,
                tasks: self.tasks,
            });
        }
        Ok(())
    }

    /// Number of particles initially held by `task` (0 for unknown tasks).
    pub fn particles_for_task(&self, task: u32) -> u32 {
        if task >= self.tasks {
            return 0;
        }
        let base = self.total / self.tasks;
        let remainder = self.total % self.tasks;
        if task < remainder { base + 1 } else { base }
    }

    /// First global index held by `task`.
    pub fn offset(&self, task: u32) -> u32 {
        (0..task.min(self.tasks))
            .map(|t| self.particles_for_task(t))
            .sum()
    }

    /// Initial index range of `task`.
    pub fn range(&self, task: u32) -> Range<u32> {
        let start = self.offset(task);
        start..start + self.particles_for_task(task)
    }

    /// Task whose initial range contains `index`.
    pub fn owner_of(&self, index: u32) -> Option<u32> {
        if index >= self.total {
            return None;
        }
        let base = self.total / self.tasks;
        let remainder = self.total % self.tasks;
        let boundary = remainder * (base + 1);
        if index < boundary {
            Some(index / (base + 1))
        } else {
            // base > 0 here: index >= boundary and index < total imply total > boundary
            Some(remainder + (index - boundary) / base)
        }
    }
}
