//! VibhagaSLAM - Distributed particle resampling for multi-task grid SLAM
//!
//! The particle population of a grid-based particle filter is split across
//! several tasks. Each task scan-matches its own particles, a planner decides
//! the resampling, and tasks exchange particle maps so that every task ends
//! the cycle holding exactly the particles assigned to it.
//!
//! # Architecture
//!
//! The crate is organized into 6 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 sim/ + config                       │  ← Local cluster
//! │      (scan source, jitter matcher, cluster)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    threads/                         │  ← Actors
//! │              (coordinator, planner)                 │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │   (coordinator state machine, dispatch, planner)    │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │       (messages, codec, transport, inbox)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   particles/                        │  ← Particle state
//! │       (map, trajectory, table, partition)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Resampling cycle
//!
//! 1. A scan reaches every task; each task matches its active particles.
//! 2. Tasks send their particle summaries to the planner.
//! 3. The planner broadcasts assignments and sends new pose/weight values.
//! 4. Tasks copy maps locally or ship them to their new owners.
//! 5. Once all maps and values are in, the owner of the best particle
//!    emits it, and every task signals ready.

pub mod config;
pub mod core;
pub mod engine;
pub mod io;
pub mod particles;
pub mod sim;
pub mod threads;

pub use config::{Config, ConfigError, load_config};
pub use engine::{
    AssignmentPlanner, CoordinatorConfig, CoordinatorError, LocalScanMatcher, LowVariancePlanner,
    MatchState, ResamplingCoordinator,
};
pub use sim::{LocalCluster, LocalClusterConfig};
