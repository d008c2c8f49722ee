//! Core data types shared by the matcher, the coordinator and the wire layer.
//!
//! - [`Point2D`]: 2D point in meters
//! - [`Pose2D`]: Robot pose (x, y, theta) in meters and radians
//! - [`LaserScan`]: Raw range scan with the odometry pose it was taken at

mod pose;
mod scan;

pub use pose::{Point2D, Pose2D};
pub use scan::LaserScan;
