//! Coordinator errors.

use thiserror::Error;

use super::state::MatchState;
use crate::engine::dispatch::DispatchError;
use crate::io::codec::{DecodeError, MessageKind};
use crate::io::transport::TransportError;
use crate::particles::PartitionError;

/// Coordinator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    /// Assignment list contradicts this task's state. Aborts the cycle.
    #[error("protocol violation: {0}")]
    InvariantViolation(String),

    /// Payload dropped, no state change.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("migration dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Message not valid in the current state; dropped.
    #[error("unexpected {kind} message in state {state}")]
    UnexpectedMessage { kind: MessageKind, state: MatchState },

    /// Message answers a scan other than the one in progress; dropped.
    #[error("stale {kind} message for scan {timestamp_us} (current scan {current_us})")]
    Stale {
        kind: MessageKind,
        timestamp_us: u64,
        current_us: u64,
    },

    #[error("invalid partition: {0}")]
    Partition(#[from] PartitionError),

    #[error("failed to start dispatch workers: {0}")]
    Spawn(String),
}

impl CoordinatorError {
    /// True for errors that drop one message and leave the cycle running.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Decode(_)
                | CoordinatorError::UnexpectedMessage { .. }
                | CoordinatorError::Stale { .. }
        )
    }
}

impl From<std::io::Error> for CoordinatorError {
    fn from(e: std::io::Error) -> Self {
        CoordinatorError::Spawn(e.to_string())
    }
}
