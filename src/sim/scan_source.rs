//! Synthetic laser scans of a square room.
//!
//! The robot drives a circle around the room center. Each scan carries the
//! exact odometry pose and ideal ranges to the walls.

use std::f32::consts::PI;

use crate::core::types::{LaserScan, Pose2D};

/// Configuration for [`SyntheticScanSource`].
#[derive(Debug, Clone)]
pub struct ScanSourceConfig {
    /// Half the side length of the room (meters).
    pub room_half_extent: f32,
    /// Beams per scan, spread over a full turn.
    pub beams: usize,
    /// Motion between scans, in the robot frame.
    pub step: Pose2D,
    /// Pose of the first scan.
    pub start: Pose2D,
    /// Time between scans (µs).
    pub interval_us: u64,
}

impl Default for ScanSourceConfig {
    fn default() -> Self {
        Self {
            room_half_extent: 4.0,
            beams: 90,
            step: Pose2D::new(0.1, 0.0, 0.05),
            start: Pose2D::new(0.0, -2.0, 0.0),
            interval_us: 100_000,
        }
    }
}

/// Endless iterator of scans along the configured path.
#[derive(Debug, Clone)]
pub struct SyntheticScanSource {
    config: ScanSourceConfig,
    pose: Pose2D,
    timestamp_us: u64,
}

impl SyntheticScanSource {
    pub fn new(config: ScanSourceConfig) -> Self {
        let pose = config.start;
        Self {
            config,
            pose,
            timestamp_us: 0,
        }
    }

    /// Pose of the next scan.
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    fn range_to_wall(&self, angle: f32) -> f32 {
        let h = self.config.room_half_extent;
        let (dy, dx) = (self.pose.theta + angle).sin_cos();
        let mut range = f32::INFINITY;
        for (origin, dir) in [(self.pose.x, dx), (self.pose.y, dy)] {
            if dir > 1e-6 {
                range = range.min((h - origin) / dir);
            } else if dir < -1e-6 {
                range = range.min((-h - origin) / dir);
            }
        }
        range
    }
}

impl Iterator for SyntheticScanSource {
    type Item = LaserScan;

    fn next(&mut self) -> Option<LaserScan> {
        let beams = self.config.beams.max(1);
        let increment = 2.0 * PI / beams as f32;
        let ranges = (0..beams)
            .map(|i| self.range_to_wall(-PI + increment * i as f32))
            .collect();
        let scan = LaserScan::new(self.pose, ranges, -PI, increment, self.timestamp_us);

        self.pose = self.pose.compose(&self.config.step);
        self.timestamp_us += self.config.interval_us;
        Some(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ranges_from_center() {
        let mut source = SyntheticScanSource::new(ScanSourceConfig {
            beams: 4,
            start: Pose2D::identity(),
            ..Default::default()
        });
        let scan = source.next().unwrap();
        assert_eq!(scan.len(), 4);
        for r in &scan.ranges {
            assert_relative_eq!(*r, 4.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_endpoints_lie_on_walls() {
        let mut source = SyntheticScanSource::new(ScanSourceConfig::default());
        source.next();
        let scan = source.next().unwrap();
        for p in scan.endpoints() {
            let world = scan.pose.transform_point(&p);
            let on_wall = (world.x.abs() - 4.0).abs() < 1e-3 || (world.y.abs() - 4.0).abs() < 1e-3;
            assert!(on_wall, "({}, {}) not on a wall", world.x, world.y);
        }
    }

    #[test]
    fn test_timestamps_advance() {
        let source = SyntheticScanSource::new(ScanSourceConfig::default());
        let stamps: Vec<u64> = source.take(3).map(|s| s.timestamp_us).collect();
        assert_eq!(stamps, vec![0, 100_000, 200_000]);
    }
}
