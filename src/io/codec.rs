//! Encoding, decoding and conversions between wire and domain types.

use std::fmt;

use prost::Message;
use thiserror::Error;

use super::messages::{LaserScanMsg, PoseMsg, Trace};
use crate::core::types::{LaserScan, Pose2D};

/// Inbound and outbound payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Scan,
    Assignments,
    Maps,
    Values,
    Summaries,
    Ready,
    BestParticle,
    /// A serialized particle map inside a map batch
    ParticleMap,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Scan => "scan",
            MessageKind::Assignments => "assignment",
            MessageKind::Maps => "map-batch",
            MessageKind::Values => "value-batch",
            MessageKind::Summaries => "summaries",
            MessageKind::Ready => "ready",
            MessageKind::BestParticle => "best-particle",
            MessageKind::ParticleMap => "particle-map",
        };
        f.write_str(name)
    }
}

/// Malformed or corrupt payload. Always transient: the message is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode {kind} message: {message}")]
pub struct DecodeError {
    pub kind: MessageKind,
    pub message: String,
}

impl DecodeError {
    pub fn new(kind: MessageKind, err: impl fmt::Display) -> Self {
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Decode a payload of the given kind.
pub fn decode<T: Message + Default>(kind: MessageKind, bytes: &[u8]) -> Result<T, DecodeError> {
    T::decode(bytes).map_err(|e| DecodeError::new(kind, e))
}

/// Encode any wire message.
#[inline]
pub fn encode<T: Message>(msg: &T) -> Vec<u8> {
    msg.encode_to_vec()
}

impl From<Pose2D> for PoseMsg {
    fn from(pose: Pose2D) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
        }
    }
}

impl From<PoseMsg> for Pose2D {
    fn from(msg: PoseMsg) -> Self {
        Pose2D::new(msg.x, msg.y, msg.theta)
    }
}

/// Pose of an optional wire field, identity when absent.
#[inline]
pub fn pose_or_identity(msg: Option<PoseMsg>) -> Pose2D {
    msg.map(Pose2D::from).unwrap_or_default()
}

impl LaserScanMsg {
    /// Wrap a scan for delivery.
    pub fn from_scan(scan: &LaserScan, sensor_id: &str, trace: Option<Trace>) -> Self {
        Self {
            pose: Some(scan.pose.into()),
            ranges: scan.ranges.clone(),
            angle_min: scan.angle_min,
            angle_increment: scan.angle_increment,
            timestamp_us: scan.timestamp_us,
            sensor_id: sensor_id.to_string(),
            trace,
        }
    }

    /// Domain scan carried by this message.
    pub fn to_scan(&self) -> LaserScan {
        LaserScan::new(
            pose_or_identity(self.pose),
            self.ranges.clone(),
            self.angle_min,
            self.angle_increment,
            self.timestamp_us,
        )
    }
}
