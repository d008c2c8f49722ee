//! Local scan-matching contract.
//!
//! The coordinator owns the particle table and hands the matcher mutable
//! access to the active slots only for the duration of each call.

use std::sync::Arc;

use crate::core::types::{LaserScan, Pose2D};
use crate::particles::{ActiveParticles, ParticleMap, ParticleTable, TrajectoryNode};

/// Result of matching one scan against the active particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// False when the scan was skipped and the cycle should end here.
    pub needs_resampling: bool,
}

impl MatchOutcome {
    /// Scan processed, summaries go to the planner.
    pub fn resample() -> Self {
        Self {
            needs_resampling: true,
        }
    }

    /// Scan ignored, cycle is skipped.
    pub fn skip() -> Self {
        Self {
            needs_resampling: false,
        }
    }
}

/// Per-task scan matcher.
///
/// Implementations update pose, weight and map of the particles listed in
/// `active`. They must not touch other slots.
pub trait LocalScanMatcher: Send {
    /// Empty map given to every particle on the first scan.
    fn empty_map(&self) -> ParticleMap {
        ParticleMap::default()
    }

    /// Seed every active particle at `pose` with an empty map and a fresh
    /// trajectory. Called once, on the first scan after INIT or reset.
    fn initialize(&mut self, pose: &Pose2D, table: &mut ParticleTable, active: &ActiveParticles) {
        let empty = Arc::new(self.empty_map());
        for particle in table.active_mut(active) {
            particle.pose = *pose;
            particle.weight = 1.0;
            particle.map = Some(Arc::clone(&empty));
            particle.node = Some(TrajectoryNode::root(*pose));
        }
    }

    /// Match `scan` against every active particle.
    fn match_scan(
        &mut self,
        scan: &LaserScan,
        table: &mut ParticleTable,
        active: &ActiveParticles,
    ) -> MatchOutcome;

    /// Post-processing after a cycle that migrated particles.
    fn after_resampling(
        &mut self,
        _scan: &LaserScan,
        _table: &mut ParticleTable,
        _active: &ActiveParticles,
    ) {
    }

    /// Post-processing after a cycle the planner did not resample.
    fn without_resampling(
        &mut self,
        _scan: &LaserScan,
        _table: &mut ParticleTable,
        _active: &ActiveParticles,
    ) {
    }
}
