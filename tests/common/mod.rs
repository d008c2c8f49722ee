//! Shared helpers for coordinator integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use vibhaga_slam::core::types::{LaserScan, Pose2D};
use vibhaga_slam::engine::{
    CoordinatorConfig, LocalScanMatcher, MatchOutcome, ResamplingCoordinator,
};
use vibhaga_slam::io::messages::{
    LaserScanMsg, ParticleAssignment, ParticleAssignments, ParticleValue, ParticleValues,
};
use vibhaga_slam::io::{Route, Transport, TransportError};
use vibhaga_slam::particles::{ActiveParticles, ParticleMap, ParticleTable};

/// Transport that records every send.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<(Route, Vec<u8>)>>,
}

impl Transport for Recorder {
    fn send(&self, route: Route, payload: Vec<u8>) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((route, payload));
        Ok(())
    }
}

impl Recorder {
    pub fn routes(&self) -> Vec<Route> {
        self.sent.lock().unwrap().iter().map(|(r, _)| *r).collect()
    }

    pub fn payloads(&self, route: Route) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == route)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn count(&self, route: Route) -> usize {
        self.payloads(route).len()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

/// Transport whose map sends to one task always fail.
pub struct FailingMaps {
    pub inner: Recorder,
    pub failing_task: u32,
}

impl Transport for FailingMaps {
    fn send(&self, route: Route, payload: Vec<u8>) -> Result<(), TransportError> {
        if route == (Route::Maps { task: self.failing_task }) {
            return Err(TransportError::Disconnected(route));
        }
        self.inner.send(route, payload)
    }
}

/// Matcher that stamps a distinct cell into each particle's map and gives
/// higher indices higher weights.
pub struct MarkingMatcher {
    pub resample: bool,
    pub post_calls: usize,
    pub resampled_calls: usize,
}

impl MarkingMatcher {
    pub fn new(resample: bool) -> Self {
        Self {
            resample,
            post_calls: 0,
            resampled_calls: 0,
        }
    }
}

impl LocalScanMatcher for MarkingMatcher {
    fn empty_map(&self) -> ParticleMap {
        ParticleMap::centered(4.0, 4.0, 0.1)
    }

    fn match_scan(
        &mut self,
        _scan: &LaserScan,
        table: &mut ParticleTable,
        active: &ActiveParticles,
    ) -> MatchOutcome {
        for particle in table.active_mut(active) {
            let x = -1.5 + particle.index as f32 * 0.2;
            if let Some(map) = particle.map_mut() {
                map.mark_hit(x, 0.5);
            }
            particle.weight = 1.0 + particle.index as f64;
        }
        if self.resample {
            MatchOutcome::resample()
        } else {
            MatchOutcome::skip()
        }
    }

    fn after_resampling(&mut self, _: &LaserScan, _: &mut ParticleTable, _: &ActiveParticles) {
        self.resampled_calls += 1;
    }

    fn without_resampling(&mut self, _: &LaserScan, _: &mut ParticleTable, _: &ActiveParticles) {
        self.post_calls += 1;
    }
}

pub fn coordinator(
    task_id: u32,
    tasks: u32,
    total: u32,
) -> (ResamplingCoordinator<MarkingMatcher>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let coordinator = coordinator_with(task_id, tasks, total, recorder.clone());
    (coordinator, recorder)
}

pub fn coordinator_with(
    task_id: u32,
    tasks: u32,
    total: u32,
    transport: Arc<dyn Transport>,
) -> ResamplingCoordinator<MarkingMatcher> {
    let config = CoordinatorConfig {
        dispatch_workers: 2,
        ..CoordinatorConfig::new(task_id, tasks, total)
    };
    ResamplingCoordinator::new(config, MarkingMatcher::new(true), transport).unwrap()
}

pub fn scan(timestamp_us: u64) -> LaserScanMsg {
    LaserScanMsg {
        pose: Some(Pose2D::new(0.5, -0.5, 0.1).into()),
        ranges: vec![1.0, 1.5, 2.0],
        angle_min: -0.5,
        angle_increment: 0.5,
        timestamp_us,
        sensor_id: "laser".into(),
        trace: None,
    }
}

pub fn assign(
    previous_task: u32,
    previous_index: u32,
    new_task: u32,
    new_index: u32,
) -> ParticleAssignment {
    ParticleAssignment {
        previous_task,
        previous_index,
        new_task,
        new_index,
    }
}

pub fn assignments(
    list: Vec<ParticleAssignment>,
    resampled: bool,
    best_particle_index: u32,
    cycle: u64,
    timestamp_us: u64,
) -> ParticleAssignments {
    ParticleAssignments {
        assignments: list,
        resampled,
        best_particle_index,
        trace: None,
        cycle,
        timestamp_us,
    }
}

/// Value batch for `(task, index)` pairs.
pub fn values(task: u32, indices: &[u32], cycle: u64) -> ParticleValues {
    ParticleValues {
        values: indices
            .iter()
            .map(|&index| ParticleValue {
                task_id: task,
                index,
                pose: Some(Pose2D::new(index as f32, 0.0, 0.0).into()),
                weight: 0.25,
            })
            .collect(),
        cycle,
    }
}
