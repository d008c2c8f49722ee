//! In-process cluster: every task, the planner and a driver on one machine.
//!
//! ```text
//!              ┌──────────── LocalHub ────────────┐
//! driver ─scan─►  task 0 … task N-1  ──summaries──► planner
//!    ▲         │      ▲   maps/values/assignments   │
//!    └─ready/best─────┴─────────────────────────────┘
//! ```
//!
//! [`LocalCluster::step`] broadcasts one scan and waits until every task that
//! accepted it is back in `WAITING_FOR_READING`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;

use crate::core::types::LaserScan;
use crate::engine::{
    AssignmentPlanner, CoordinatorConfig, CoordinatorError, CoordinatorStats, LocalScanMatcher,
    ResamplingCoordinator,
};
use crate::io::codec::{MessageKind, decode, encode};
use crate::io::messages::{BestParticle, LaserScanMsg, Ready, Trace};
use crate::io::{HubReceivers, LocalHub, Transport, TransportError, create_inbox};
use crate::threads::{CoordinatorThread, PlannerThread};

/// Configuration for [`LocalCluster`].
#[derive(Debug, Clone)]
pub struct LocalClusterConfig {
    pub total_particles: u32,
    pub tasks: u32,
    /// Sensor id stamped on every scan.
    pub sensor_id: String,
    pub dispatch_workers: usize,
    pub dispatch_timeout: Option<Duration>,
    /// How long [`LocalCluster::step`] waits for every task to be ready.
    pub ready_timeout: Duration,
}

impl Default for LocalClusterConfig {
    fn default() -> Self {
        Self {
            total_particles: 30,
            tasks: 3,
            sensor_id: "laser".into(),
            dispatch_workers: 8,
            dispatch_timeout: None,
            ready_timeout: Duration::from_secs(5),
        }
    }
}

/// Cluster errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("coordinator setup failed: {0}")]
    Coordinator(#[from] CoordinatorError),

    #[error("failed to spawn thread: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{ready} of {expected} tasks ready after {timeout:?}")]
    ReadyTimeout {
        ready: usize,
        expected: usize,
        timeout: Duration,
    },

    #[error("cluster output streams disconnected")]
    Disconnected,
}

/// Outcome of one scan.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Scan timestamp (µs)
    pub timestamp_us: u64,
    /// Tasks that accepted the scan
    pub delivered: usize,
    /// Best particle, if the cycle emitted one
    pub best: Option<BestParticle>,
    /// Decoded trace of the best particle
    pub trace: Option<Trace>,
}

/// Final counters after shutdown.
#[derive(Debug, Clone, Default)]
pub struct ClusterSummary {
    pub cycles_planned: u64,
    /// Counters per task, in task order
    pub tasks: Vec<CoordinatorStats>,
}

/// All tasks of a cluster running on local threads.
pub struct LocalCluster {
    config: LocalClusterConfig,
    hub: Arc<LocalHub>,
    best_rx: Receiver<Vec<u8>>,
    ready_rx: Receiver<Vec<u8>>,
    coordinators: Vec<CoordinatorThread>,
    planner: PlannerThread,
    running: Arc<AtomicBool>,
}

impl LocalCluster {
    /// Build every task and the planner, and start their threads.
    ///
    /// `make_matcher` is called once per task id.
    pub fn start<M, F, P>(
        config: LocalClusterConfig,
        mut make_matcher: F,
        planner: P,
    ) -> Result<Self, ClusterError>
    where
        M: LocalScanMatcher + 'static,
        F: FnMut(u32) -> M,
        P: AssignmentPlanner + 'static,
    {
        let (inboxes, receivers): (Vec<_>, Vec<_>) = (0..config.tasks).map(create_inbox).unzip();
        let (hub, outputs) = LocalHub::new(inboxes);
        let hub = Arc::new(hub);
        let transport: Arc<dyn Transport> = hub.clone();
        let HubReceivers {
            summaries_rx,
            best_rx,
            ready_rx,
        } = outputs;
        let running = Arc::new(AtomicBool::new(true));

        let spawned = (|| {
            let mut coordinators = Vec::with_capacity(config.tasks as usize);
            for (task_id, inbox_rx) in (0..config.tasks).zip(receivers) {
                let coordinator_config = CoordinatorConfig {
                    dispatch_workers: config.dispatch_workers,
                    dispatch_timeout: config.dispatch_timeout,
                    ..CoordinatorConfig::new(task_id, config.tasks, config.total_particles)
                };
                let coordinator = ResamplingCoordinator::new(
                    coordinator_config,
                    make_matcher(task_id),
                    Arc::clone(&transport),
                )?;
                coordinators.push(CoordinatorThread::spawn(
                    coordinator,
                    inbox_rx,
                    Arc::clone(&running),
                )?);
            }
            let planner = PlannerThread::spawn(
                planner,
                config.tasks,
                summaries_rx,
                Arc::clone(&transport),
                Arc::clone(&running),
            )?;
            Ok::<_, ClusterError>((coordinators, planner))
        })();

        let (coordinators, planner) = match spawned {
            Ok(threads) => threads,
            Err(e) => {
                running.store(false, Ordering::Relaxed);
                return Err(e);
            }
        };

        log::info!(
            "Local cluster started: {} tasks, {} particles",
            config.tasks,
            config.total_particles
        );
        Ok(Self {
            config,
            hub,
            best_rx,
            ready_rx,
            coordinators,
            planner,
            running,
        })
    }

    /// Number of tasks.
    pub fn tasks(&self) -> u32 {
        self.config.tasks
    }

    /// Run one cycle for `scan`.
    pub fn step(&mut self, scan: &LaserScan) -> Result<CycleReport, ClusterError> {
        self.discard_stale_outputs();

        let msg = LaserScanMsg::from_scan(scan, &self.config.sensor_id, None);
        let delivered = self.hub.broadcast_scan(&encode(&msg));
        self.await_ready(delivered)?;

        // A task emits its best particle before its ready signal.
        let best = self
            .best_rx
            .try_iter()
            .filter_map(|payload| decode::<BestParticle>(MessageKind::BestParticle, &payload).ok())
            .last();
        let trace = best
            .as_ref()
            .and_then(|b| decode::<Trace>(MessageKind::BestParticle, &b.trace).ok());

        Ok(CycleReport {
            timestamp_us: scan.timestamp_us,
            delivered,
            best,
            trace,
        })
    }

    /// Ask every task to re-initialize and wait until all of them are ready.
    pub fn reset(&mut self) -> Result<(), ClusterError> {
        log::warn!("Resetting all {} tasks", self.config.tasks);
        self.discard_stale_outputs();
        self.hub.broadcast_reset()?;
        self.await_ready(self.config.tasks as usize)
    }

    fn discard_stale_outputs(&self) {
        let stale = self.ready_rx.try_iter().count() + self.best_rx.try_iter().count();
        if stale > 0 {
            log::debug!("Discarded {} stale cluster outputs", stale);
        }
    }

    /// Wait for ready signals from `expected` distinct tasks.
    fn await_ready(&self, expected: usize) -> Result<(), ClusterError> {
        let deadline = Instant::now() + self.config.ready_timeout;
        let mut ready = BTreeSet::new();
        while ready.len() < expected {
            match self.ready_rx.recv_deadline(deadline) {
                Ok(payload) => match decode::<Ready>(MessageKind::Ready, &payload) {
                    Ok(r) => {
                        ready.insert(r.task_id);
                    }
                    Err(e) => log::warn!("{}", e),
                },
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ClusterError::ReadyTimeout {
                        ready: ready.len(),
                        expected,
                        timeout: self.config.ready_timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ClusterError::Disconnected),
            }
        }
        Ok(())
    }

    /// Stop every thread and collect their counters.
    pub fn shutdown(self) -> ClusterSummary {
        self.running.store(false, Ordering::Relaxed);
        let mut summary = ClusterSummary::default();
        for thread in self.coordinators {
            let task_id = thread.task_id();
            match thread.join() {
                Ok(stats) => summary.tasks.push(stats),
                Err(_) => {
                    log::error!("taskId {}: Coordinator thread panicked", task_id);
                    summary.tasks.push(CoordinatorStats::default());
                }
            }
        }
        match self.planner.join() {
            Ok(cycles) => summary.cycles_planned = cycles,
            Err(_) => log::error!("Planner thread panicked"),
        }
        log::info!(
            "Local cluster stopped after {} planned cycles",
            summary.cycles_planned
        );
        summary
    }
}
