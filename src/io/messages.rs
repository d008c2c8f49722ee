//! Protobuf message contracts exchanged between tasks and the planner.
//!
//! Field names follow the cluster protocol: assignments are keyed by
//! `(previous_task, previous_index) → (new_task, new_index)`, map batches
//! carry serialized maps plus root-first trajectory poses, and value batches
//! carry pose + weight only.

use std::collections::HashMap;

/// Pose on the wire.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct PoseMsg {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(float, tag = "3")]
    pub theta: f32,
}

/// Per-cycle timing metadata, threaded from scan to best-particle emission.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Trace {
    /// Local scan-matching time per task (ms)
    #[prost(map = "uint32, int64", tag = "1")]
    pub scan_match_ms: HashMap<u32, i64>,
    /// Assignment receipt to best-particle emission (ms)
    #[prost(int64, tag = "2")]
    pub assignment_to_emit_ms: i64,
    /// Scan processing start to best-particle emission (ms)
    #[prost(int64, tag = "3")]
    pub scan_to_emit_ms: i64,
    /// Post-resampling processing (ms)
    #[prost(int64, tag = "4")]
    pub post_process_ms: i64,
    /// Planner cycle this trace belongs to
    #[prost(uint64, tag = "5")]
    pub cycle: u64,
}

/// Laser scan as delivered to every task.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LaserScanMsg {
    #[prost(message, optional, tag = "1")]
    pub pose: Option<PoseMsg>,
    #[prost(float, repeated, tag = "2")]
    pub ranges: Vec<f32>,
    #[prost(float, tag = "3")]
    pub angle_min: f32,
    #[prost(float, tag = "4")]
    pub angle_increment: f32,
    #[prost(uint64, tag = "5")]
    pub timestamp_us: u64,
    #[prost(string, tag = "6")]
    pub sensor_id: String,
    #[prost(message, optional, tag = "7")]
    pub trace: Option<Trace>,
}

/// One ownership move decided by the planner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, prost::Message)]
pub struct ParticleAssignment {
    #[prost(uint32, tag = "1")]
    pub previous_task: u32,
    #[prost(uint32, tag = "2")]
    pub previous_index: u32,
    #[prost(uint32, tag = "3")]
    pub new_task: u32,
    #[prost(uint32, tag = "4")]
    pub new_index: u32,
}

/// Global resampling decision, broadcast once per cycle to every task.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParticleAssignments {
    #[prost(message, repeated, tag = "1")]
    pub assignments: Vec<ParticleAssignment>,
    #[prost(bool, tag = "2")]
    pub resampled: bool,
    #[prost(uint32, tag = "3")]
    pub best_particle_index: u32,
    #[prost(message, optional, tag = "4")]
    pub trace: Option<Trace>,
    /// Monotonic planner cycle; map and value batches echo it
    #[prost(uint64, tag = "5")]
    pub cycle: u64,
    /// Timestamp of the scan this plan answers
    #[prost(uint64, tag = "6")]
    pub timestamp_us: u64,
}

/// Heavy state of one migrating particle.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParticleMaps {
    #[prost(bytes = "vec", tag = "1")]
    pub serialized_map: Vec<u8>,
    /// Destination index
    #[prost(uint32, tag = "2")]
    pub index: u32,
    /// Destination task
    #[prost(uint32, tag = "3")]
    pub task: u32,
    /// Root-first trajectory
    #[prost(message, repeated, tag = "4")]
    pub nodes: Vec<PoseMsg>,
}

/// All map transfers from one task to one destination task in a cycle.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParticleMapsList {
    #[prost(message, repeated, tag = "1")]
    pub maps: Vec<ParticleMaps>,
    #[prost(uint64, tag = "2")]
    pub cycle: u64,
    #[prost(uint32, tag = "3")]
    pub source_task: u32,
}

/// Lightweight pose + weight snapshot.
#[derive(Clone, Copy, PartialEq, prost::Message)]
pub struct ParticleValue {
    /// Owning task (source in summaries, destination in value batches)
    #[prost(uint32, tag = "1")]
    pub task_id: u32,
    #[prost(uint32, tag = "2")]
    pub index: u32,
    #[prost(message, optional, tag = "3")]
    pub pose: Option<PoseMsg>,
    #[prost(double, tag = "4")]
    pub weight: f64,
}

/// Pose/weight updates addressed to one task.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParticleValues {
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<ParticleValue>,
    #[prost(uint64, tag = "2")]
    pub cycle: u64,
}

/// Post-matching summaries a task hands to the planner.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ParticleSummaries {
    #[prost(uint32, tag = "1")]
    pub task_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub values: Vec<ParticleValue>,
    #[prost(message, optional, tag = "3")]
    pub scan: Option<LaserScanMsg>,
    #[prost(message, optional, tag = "4")]
    pub trace: Option<Trace>,
}

/// Task is back in `WAITING_FOR_READING`.
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct Ready {
    #[prost(uint32, tag = "1")]
    pub task_id: u32,
}

/// Best particle of a cycle, emitted by the task that owns it.
#[derive(Clone, PartialEq, prost::Message)]
pub struct BestParticle {
    /// Encoded [`Trace`]
    #[prost(bytes = "vec", tag = "1")]
    pub trace: Vec<u8>,
    #[prost(string, tag = "2")]
    pub sensor_id: String,
    #[prost(uint64, tag = "3")]
    pub timestamp_us: u64,
    #[prost(uint32, tag = "4")]
    pub task_id: u32,
    #[prost(uint32, tag = "5")]
    pub index: u32,
    #[prost(message, optional, tag = "6")]
    pub pose: Option<PoseMsg>,
}
