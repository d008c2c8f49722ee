//! Coordinator state machine states.

use std::fmt;

/// Where a task is in the resampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatchState {
    /// Partition not computed yet
    #[default]
    Init,
    /// Idle, the next scan starts a cycle
    WaitingForReading,
    /// Local scan matching in progress
    ComputingInitReadings,
    /// Summaries sent, waiting for the planner's decision
    WaitingForParticleAssignments,
    /// Migration started, waiting for inbound maps and values
    WaitingForNewParticles,
    /// Finalizing the cycle
    ComputingNewParticles,
}

impl MatchState {
    /// Protocol name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchState::Init => "INIT",
            MatchState::WaitingForReading => "WAITING_FOR_READING",
            MatchState::ComputingInitReadings => "COMPUTING_INIT_READINGS",
            MatchState::WaitingForParticleAssignments => "WAITING_FOR_PARTICLE_ASSIGNMENTS",
            MatchState::WaitingForNewParticles => "WAITING_FOR_NEW_PARTICLES",
            MatchState::ComputingNewParticles => "COMPUTING_NEW_PARTICLES",
        }
    }

    /// True if `next` follows `self` in a regular cycle.
    ///
    /// Aborts (any state back to `WaitingForReading`) and resets (any state
    /// back to `Init`) are not cycle transitions.
    pub fn is_cycle_transition(self, next: MatchState) -> bool {
        use MatchState::*;
        matches!(
            (self, next),
            (Init, WaitingForReading)
                | (WaitingForReading, ComputingInitReadings)
                | (ComputingInitReadings, WaitingForParticleAssignments)
                | (ComputingInitReadings, WaitingForReading)
                | (WaitingForParticleAssignments, ComputingNewParticles)
                | (WaitingForParticleAssignments, WaitingForNewParticles)
                | (WaitingForNewParticles, ComputingNewParticles)
                | (ComputingNewParticles, WaitingForReading)
        )
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
