//! Laser scan type.

use super::pose::{Point2D, Pose2D};

/// Raw LiDAR scan in polar coordinates.
///
/// Carries the odometry pose the scan was taken at; the first scan of a
/// session seeds every particle with it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaserScan {
    /// Odometry pose at capture time
    pub pose: Pose2D,
    /// Range measurements in meters (0 or NaN = invalid)
    pub ranges: Vec<f32>,
    /// Angle of the first reading in radians
    pub angle_min: f32,
    /// Angular resolution (radians between consecutive readings)
    pub angle_increment: f32,
    /// Capture time in microseconds
    pub timestamp_us: u64,
}

impl LaserScan {
    /// Create a scan with uniformly spaced readings.
    pub fn new(
        pose: Pose2D,
        ranges: Vec<f32>,
        angle_min: f32,
        angle_increment: f32,
        timestamp_us: u64,
    ) -> Self {
        Self {
            pose,
            ranges,
            angle_min,
            angle_increment,
            timestamp_us,
        }
    }

    /// Number of readings.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the scan has no readings.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Angle of the last reading.
    pub fn angle_max(&self) -> f32 {
        self.angle_min + self.angle_increment * self.ranges.len().saturating_sub(1) as f32
    }

    /// Per-reading beam angles in radians.
    pub fn angles(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.ranges.len()).map(move |i| self.angle_min + self.angle_increment * i as f32)
    }

    /// Beam endpoints in the sensor frame, skipping invalid readings.
    pub fn endpoints(&self) -> impl Iterator<Item = Point2D> + '_ {
        self.angles()
            .zip(self.ranges.iter().copied())
            .filter(|(_, r)| r.is_finite() && *r > 0.0)
            .map(|(a, r)| {
                let (sin_a, cos_a) = a.sin_cos();
                Point2D::new(r * cos_a, r * sin_a)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_angles_uniform() {
        let scan = LaserScan::new(Pose2D::identity(), vec![1.0; 3], -0.5, 0.5, 0);
        let angles: Vec<f32> = scan.angles().collect();
        assert_eq!(angles.len(), 3);
        assert_relative_eq!(angles[0], -0.5);
        assert_relative_eq!(angles[2], 0.5);
        assert_relative_eq!(scan.angle_max(), 0.5);
    }

    #[test]
    fn test_endpoints_skip_invalid() {
        let scan = LaserScan::new(
            Pose2D::identity(),
            vec![1.0, 0.0, f32::NAN, 2.0],
            0.0,
            FRAC_PI_2,
            0,
        );
        let points: Vec<Point2D> = scan.endpoints().collect();
        assert_eq!(points.len(), 2);
        assert_relative_eq!(points[0].x, 1.0);
        // Fourth beam points along 3π/2
        assert_relative_eq!(points[1].y, -2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_empty_scan() {
        let scan = LaserScan::default();
        assert!(scan.is_empty());
        assert_relative_eq!(scan.angle_max(), 0.0);
    }
}
