//! Outbound transport contract.
//!
//! The coordinator never talks to sockets or brokers directly. Everything it
//! emits goes through [`Transport::send`] with a [`Route`]; the routing and
//! delivery guarantees belong to the implementation.

use thiserror::Error;

/// Destination of an outbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Laser scan for one task
    Scan { task: u32 },
    /// Planner decision for one task
    Assignments { task: u32 },
    /// Map batch for one task
    Maps { task: u32 },
    /// Value batch for one task
    Values { task: u32 },
    /// Post-matching summaries for the planner
    Summaries,
    /// Reset request for one task
    Control { task: u32 },
    /// Best-particle result stream
    BestParticle,
    /// Ready signal stream
    Ready,
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no route to task {0}")]
    UnknownTask(u32),

    #[error("{0:?} endpoint disconnected")]
    Disconnected(Route),

    #[error("{0:?} endpoint full, payload dropped")]
    Full(Route),
}

/// Sends encoded payloads. Called concurrently from dispatch workers.
pub trait Transport: Send + Sync {
    /// Hand `payload` to the transport. Returns once the send is accepted.
    fn send(&self, route: Route, payload: Vec<u8>) -> Result<(), TransportError>;
}
