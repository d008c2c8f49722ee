//! Reference scan matcher used by the local cluster.
//!
//! Each particle follows the odometry delta with Gaussian jitter and is
//! scored by the fraction of scan endpoints that fall on cells its own map
//! has already seen hit. Maps and trajectories are extended after the
//! planner's decision, once per cycle.

use std::f32::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::math::angle_diff;
use crate::core::types::{LaserScan, Point2D, Pose2D};
use crate::engine::{LocalScanMatcher, MatchOutcome};
use crate::particles::{ActiveParticles, ParticleMap, ParticleTable};

/// Weight factor applied even when no endpoint matches.
const SCORE_FLOOR: f64 = 0.05;

/// Configuration for [`JitterMatcher`].
#[derive(Debug, Clone)]
pub struct JitterMatcherConfig {
    /// Position noise per scan (meters, 1σ).
    pub spread_xy: f32,
    /// Heading noise per scan (radians, 1σ).
    pub spread_theta: f32,
    /// Skip scans until the robot moved this far (meters + radians).
    pub min_travel: f32,
    /// Side length of each particle map (meters).
    pub map_size: f32,
    /// Map cell size (meters).
    pub map_resolution: f32,
    /// RNG seed (0 = seed from the OS).
    pub seed: u64,
}

impl Default for JitterMatcherConfig {
    fn default() -> Self {
        Self {
            spread_xy: 0.02,
            spread_theta: 0.01,
            min_travel: 0.0,
            map_size: 10.0,
            map_resolution: 0.1,
            seed: 0,
        }
    }
}

/// Odometry-plus-noise matcher with a hit-ratio score.
pub struct JitterMatcher {
    config: JitterMatcherConfig,
    rng: StdRng,
    last_odom: Option<Pose2D>,
}

impl JitterMatcher {
    pub fn new(config: JitterMatcherConfig) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };
        Self {
            config,
            rng,
            last_odom: None,
        }
    }

    fn gaussian(&mut self, sigma: f32) -> f32 {
        if sigma < 1e-10 {
            return 0.0;
        }
        // Box-Muller transform
        let u1 = self.rng.random::<f32>().max(1e-10);
        let u2 = self.rng.random::<f32>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos() * sigma
    }

    fn integrate(&self, scan: &LaserScan, table: &mut ParticleTable, active: &ActiveParticles) {
        let endpoints: Vec<Point2D> = scan.endpoints().collect();
        for particle in table.active_mut(active) {
            let pose = particle.pose;
            if let Some(map) = particle.map_mut() {
                for p in &endpoints {
                    let world = pose.transform_point(p);
                    map.mark_hit(world.x, world.y);
                }
            }
            particle.push_pose(pose);
        }
    }
}

/// Fraction of endpoints that land on previously hit cells.
fn hit_ratio(map: &ParticleMap, pose: &Pose2D, endpoints: &[Point2D]) -> f64 {
    if endpoints.is_empty() {
        return 0.0;
    }
    let hits = endpoints
        .iter()
        .filter(|p| {
            let world = pose.transform_point(p);
            map.world_to_cell(world.x, world.y)
                .and_then(|(cx, cy)| map.cell(cx, cy))
                .is_some_and(|count| count > 0)
        })
        .count();
    hits as f64 / endpoints.len() as f64
}

impl LocalScanMatcher for JitterMatcher {
    fn empty_map(&self) -> ParticleMap {
        ParticleMap::centered(
            self.config.map_size,
            self.config.map_size,
            self.config.map_resolution,
        )
    }

    fn match_scan(
        &mut self,
        scan: &LaserScan,
        table: &mut ParticleTable,
        active: &ActiveParticles,
    ) -> MatchOutcome {
        let odom = scan.pose;
        let delta = match self.last_odom {
            Some(last) => {
                let travel = last.distance(&odom) + angle_diff(last.theta, odom.theta).abs();
                if travel < self.config.min_travel {
                    return MatchOutcome::skip();
                }
                last.inverse().compose(&odom)
            }
            None => Pose2D::identity(),
        };
        self.last_odom = Some(odom);

        let endpoints: Vec<Point2D> = scan.endpoints().collect();
        let (spread_xy, spread_theta) = (self.config.spread_xy, self.config.spread_theta);
        for particle in table.active_mut(active) {
            let noisy = Pose2D::new(
                delta.x + self.gaussian(spread_xy),
                delta.y + self.gaussian(spread_xy),
                delta.theta + self.gaussian(spread_theta),
            );
            particle.pose = particle.pose.compose(&noisy);
            let score = particle
                .map
                .as_deref()
                .map_or(0.0, |map| hit_ratio(map, &particle.pose, &endpoints));
            particle.weight *= SCORE_FLOOR + score;
        }
        MatchOutcome::resample()
    }

    fn after_resampling(
        &mut self,
        scan: &LaserScan,
        table: &mut ParticleTable,
        active: &ActiveParticles,
    ) {
        self.integrate(scan, table, active);
    }

    fn without_resampling(
        &mut self,
        scan: &LaserScan,
        table: &mut ParticleTable,
        active: &ActiveParticles,
    ) {
        self.integrate(scan, table, active);
    }
}
