//! Per-task resampling coordinator.
//!
//! One [`ResamplingCoordinator`] runs on every task. It owns the full
//! particle table, the task's active set and all per-cycle bookkeeping, and
//! is driven by one message at a time (see `threads::CoordinatorThread`).
//!
//! # Cycle
//!
//! ```text
//! INIT ──► WAITING_FOR_READING ──scan──► COMPUTING_INIT_READINGS
//!               ▲     ▲                       │ no resampling
//!               │     └───────────────────────┘
//!               │                             │ summaries sent
//!               │                             ▼
//!               │              WAITING_FOR_PARTICLE_ASSIGNMENTS ──┐ resampled=false
//!               │                             │ resampled=true    │
//!               │                             ▼                   │
//!               │              WAITING_FOR_NEW_PARTICLES          │
//!               │                             │ all maps+values   │
//!               │                             ▼                   │
//!               └── ready ◄──── COMPUTING_NEW_PARTICLES ◄─────────┘
//! ```
//!
//! Map and value batches that overtake the assignment broadcast are held in
//! [`PendingBuffers`] and replayed, in arrival order, as soon as the
//! assignments are in. Batches from another planner cycle are dropped and
//! each destination index is applied at most once per kind.
//!
//! # Failure handling
//!
//! Every check on an assignment list runs before any state changes and
//! outbound batches are fully dispatched before local copies are applied.
//! A rejected list or a failed dispatch aborts the cycle: pending buffers
//! and cycle bookkeeping are dropped, the task returns to
//! `WAITING_FOR_READING` and signals ready.

mod error;
mod migration;
mod pending;
mod state;

pub use error::CoordinatorError;
pub use migration::{Acceptance, IncomingTransfers, LocalCopy, MigrationPlan, plan_migration};
pub use pending::PendingBuffers;
pub use state::MatchState;

use std::sync::Arc;
use std::time::{Duration, Instant};

use prost::Message;

use crate::core::types::{LaserScan, Pose2D};
use crate::engine::dispatch::DispatchPool;
use crate::engine::matcher::LocalScanMatcher;
use crate::io::codec::{self, DecodeError, MessageKind, encode, pose_or_identity};
use crate::io::inbox::Inbound;
use crate::io::messages::{
    BestParticle, LaserScanMsg, ParticleAssignments, ParticleMapsList, ParticleSummaries,
    ParticleValue, ParticleValues, Ready, Trace,
};
use crate::io::transport::{Route, Transport};
use crate::particles::{ActiveParticles, ParticleMap, ParticleTable, Partition, TrajectoryNode};

/// Initialization input of one coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// This task's id, in `0..total_tasks`.
    pub task_id: u32,
    /// Number of tasks sharing the particle population.
    pub total_tasks: u32,
    /// Particle population size across all tasks.
    pub total_particles: u32,
    /// Worker threads for outbound map batches.
    pub dispatch_workers: usize,
    /// Upper bound on the dispatch wait (`None` waits indefinitely).
    pub dispatch_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    /// Config with the default dispatch settings.
    pub fn new(task_id: u32, total_tasks: u32, total_particles: u32) -> Self {
        Self {
            task_id,
            total_tasks,
            total_particles,
            dispatch_workers: 8,
            dispatch_timeout: None,
        }
    }
}

/// Counters for monitoring one coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub scans_processed: u64,
    /// Scans that arrived outside `WAITING_FOR_READING`
    pub scans_discarded: u64,
    pub cycles_completed: u64,
    /// Cycles ended by the matcher before resampling
    pub cycles_skipped: u64,
    pub cycles_aborted: u64,
    /// Undecodable, out-of-state or stale messages
    pub messages_dropped: u64,
    pub maps_sent: u64,
    pub maps_received: u64,
    pub values_received: u64,
    /// Inactive slots whose map and trajectory were freed
    pub particles_released: u64,
    pub best_particles_emitted: u64,
}

/// State of the cycle in progress.
struct CycleContext {
    scan: LaserScan,
    sensor_id: String,
    started: Instant,
    trace: Trace,
    /// Set once the assignments are in
    migration: Option<Migration>,
}

struct Migration {
    cycle: u64,
    resampled: bool,
    best_particle_index: u32,
    received: Instant,
    incoming: IncomingTransfers,
    next_active: ActiveParticles,
}

/// Distributed resampling state machine of one task.
pub struct ResamplingCoordinator<M> {
    config: CoordinatorConfig,
    partition: Partition,
    state: MatchState,
    matcher: M,
    table: ParticleTable,
    active: ActiveParticles,
    transport: Arc<dyn Transport>,
    dispatcher: DispatchPool,
    pending: PendingBuffers,
    cycle: Option<CycleContext>,
    /// Planner cycle of the last accepted assignment list
    last_cycle: Option<u64>,
    got_first_scan: bool,
    stats: CoordinatorStats,
}

impl<M: LocalScanMatcher> ResamplingCoordinator<M> {
    /// Create the coordinator, partition the particles and enter
    /// `WAITING_FOR_READING`.
    pub fn new(
        config: CoordinatorConfig,
        matcher: M,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CoordinatorError> {
        let partition = Partition::new(config.total_particles, config.total_tasks)?;
        partition.check_task(config.task_id)?;
        let dispatcher = DispatchPool::new(
            &format!("task{}", config.task_id),
            config.dispatch_workers,
            Arc::clone(&transport),
            config.dispatch_timeout,
        )?;

        let mut coordinator = Self {
            config,
            partition,
            state: MatchState::Init,
            matcher,
            table: ParticleTable::default(),
            active: ActiveParticles::new(),
            transport,
            dispatcher,
            pending: PendingBuffers::for_tasks(partition.tasks()),
            cycle: None,
            last_cycle: None,
            got_first_scan: false,
            stats: CoordinatorStats::default(),
        };
        coordinator.init();
        Ok(coordinator)
    }

    fn init(&mut self) {
        let task_id = self.config.task_id;
        let range = self.partition.range(task_id);
        self.table = ParticleTable::new(self.partition.total());
        self.active = range.clone().collect();
        self.cycle = None;
        self.last_cycle = None;
        self.got_first_scan = false;
        log::info!(
            "taskId {}: Initialized particles {}..{} ({} of {} over {} tasks)",
            task_id,
            range.start,
            range.end,
            self.active.len(),
            self.partition.total(),
            self.partition.tasks()
        );
        self.transition(MatchState::WaitingForReading);
    }

    /// Drop all particle state, re-run INIT and signal ready. The next scan
    /// seeds the particles again.
    pub fn reset(&mut self) -> Result<(), CoordinatorError> {
        let dropped = self.pending.clear();
        log::info!(
            "taskId {}: Reset in state {} ({} buffered batches dropped)",
            self.config.task_id,
            self.state,
            dropped
        );
        self.state = MatchState::Init;
        self.init();
        self.send_ready()
    }

    #[inline]
    pub fn task_id(&self) -> u32 {
        self.config.task_id
    }

    #[inline]
    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Indices this task currently maintains.
    pub fn active_particles(&self) -> &ActiveParticles {
        &self.active
    }

    /// The full particle table, active or not.
    pub fn particles(&self) -> &ParticleTable {
        &self.table
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    /// Maps still outstanding this cycle.
    pub fn expecting_particle_maps(&self) -> usize {
        self.migration()
            .map_or(0, |m| m.incoming.expecting_maps())
    }

    /// Values still outstanding this cycle.
    pub fn expecting_particle_values(&self) -> usize {
        self.migration()
            .map_or(0, |m| m.incoming.expecting_values())
    }

    /// Buffered (map, value) batch counts.
    pub fn pending_counts(&self) -> (usize, usize) {
        self.pending.counts()
    }

    fn migration(&self) -> Option<&Migration> {
        self.cycle.as_ref().and_then(|c| c.migration.as_ref())
    }

    /// Decode an inbound payload and route it.
    ///
    /// Undecodable payloads are dropped without any state change and
    /// reported as a transient error.
    pub fn handle_inbound(&mut self, inbound: Inbound) -> Result<(), CoordinatorError> {
        match inbound {
            Inbound::Scan(bytes) => {
                let msg = self.decode(MessageKind::Scan, &bytes)?;
                self.handle_scan(msg)
            }
            Inbound::Assignments(bytes) => {
                let msg = self.decode(MessageKind::Assignments, &bytes)?;
                self.handle_assignments(msg)
            }
            Inbound::Maps(bytes) => {
                let msg = self.decode(MessageKind::Maps, &bytes)?;
                self.handle_maps(msg)
            }
            Inbound::Values(bytes) => {
                let msg = self.decode(MessageKind::Values, &bytes)?;
                self.handle_values(msg)
            }
            Inbound::Reset => self.reset(),
        }
    }

    fn decode<T: Message + Default>(
        &mut self,
        kind: MessageKind,
        bytes: &[u8],
    ) -> Result<T, CoordinatorError> {
        codec::decode(kind, bytes).map_err(|e| {
            self.stats.messages_dropped += 1;
            CoordinatorError::from(e)
        })
    }

    /// Start a cycle with a new scan. Ignored outside `WAITING_FOR_READING`.
    pub fn handle_scan(&mut self, msg: LaserScanMsg) -> Result<(), CoordinatorError> {
        let task_id = self.config.task_id;
        if self.state != MatchState::WaitingForReading {
            self.stats.scans_discarded += 1;
            log::debug!(
                "taskId {}: Discarding scan {} in state {}",
                task_id,
                msg.timestamp_us,
                self.state
            );
            return Ok(());
        }

        let started = Instant::now();
        let scan = msg.to_scan();
        self.stats.scans_processed += 1;
        self.transition(MatchState::ComputingInitReadings);

        if !self.got_first_scan {
            log::info!(
                "taskId {}: Seeding particles at ({:.2}, {:.2}, {:.2})",
                task_id,
                scan.pose.x,
                scan.pose.y,
                scan.pose.theta
            );
            self.matcher
                .initialize(&scan.pose, &mut self.table, &self.active);
            self.got_first_scan = true;
        }

        let outcome = self
            .matcher
            .match_scan(&scan, &mut self.table, &self.active);
        if !outcome.needs_resampling {
            self.stats.cycles_skipped += 1;
            log::debug!("taskId {}: Scan {} skipped", task_id, scan.timestamp_us);
            return self.change_to_ready();
        }

        let mut trace = msg.trace.clone().unwrap_or_default();
        trace.scan_match_ms.insert(task_id, elapsed_ms(started));

        let summaries = ParticleSummaries {
            task_id,
            values: self
                .active
                .iter()
                .filter_map(|&i| self.table.get(i))
                .map(|p| ParticleValue {
                    task_id,
                    index: p.index,
                    pose: Some(p.pose.into()),
                    weight: p.weight,
                })
                .collect(),
            scan: Some(msg.clone()),
            trace: Some(trace.clone()),
        };

        self.cycle = Some(CycleContext {
            scan,
            sensor_id: msg.sensor_id,
            started,
            trace,
            migration: None,
        });
        self.transition(MatchState::WaitingForParticleAssignments);

        if let Err(e) = self.transport.send(Route::Summaries, encode(&summaries)) {
            let err = CoordinatorError::from(e);
            self.abort_cycle(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Apply the planner's decision for the current cycle.
    pub fn handle_assignments(
        &mut self,
        assignments: ParticleAssignments,
    ) -> Result<(), CoordinatorError> {
        if self.state != MatchState::WaitingForParticleAssignments {
            return Err(self.unexpected(MessageKind::Assignments));
        }
        let task_id = self.config.task_id;
        let Some(current_us) = self.cycle.as_ref().map(|c| c.scan.timestamp_us) else {
            let err = CoordinatorError::InvariantViolation("no cycle in progress".into());
            self.abort_cycle(&err);
            return Err(err);
        };
        if assignments.timestamp_us != current_us {
            self.stats.messages_dropped += 1;
            return Err(CoordinatorError::Stale {
                kind: MessageKind::Assignments,
                timestamp_us: assignments.timestamp_us,
                current_us,
            });
        }
        let received = Instant::now();
        log::info!(
            "taskId {}: Received {} assignments for cycle {} (resampled: {})",
            task_id,
            assignments.assignments.len(),
            assignments.cycle,
            assignments.resampled
        );

        let migration = if assignments.resampled {
            let plan = match plan_migration(task_id, &assignments, &self.active, &self.table) {
                Ok(plan) => plan,
                Err(e) => {
                    self.abort_cycle(&e);
                    return Err(e);
                }
            };
            let outbound_maps = plan.outbound_maps();
            log::debug!(
                "taskId {}: {} local copies, {} maps to {} tasks ({} serialized), expecting {} maps and {} values",
                task_id,
                plan.local_copies.len(),
                outbound_maps,
                plan.outbound.len(),
                plan.serialized,
                plan.incoming.expecting_maps(),
                plan.incoming.expecting_values()
            );

            if let Err(e) = self.dispatcher.dispatch(plan.outbound) {
                let err = CoordinatorError::from(e);
                self.abort_cycle(&err);
                return Err(err);
            }
            self.stats.maps_sent += outbound_maps as u64;

            for copy in plan.local_copies {
                if let Some(particle) = self.table.get_mut(copy.new_index) {
                    particle.map = copy.map;
                    particle.node = copy.node;
                }
            }

            Migration {
                cycle: assignments.cycle,
                resampled: true,
                best_particle_index: assignments.best_particle_index,
                received,
                incoming: plan.incoming,
                next_active: plan.local_indices,
            }
        } else {
            Migration {
                cycle: assignments.cycle,
                resampled: false,
                best_particle_index: assignments.best_particle_index,
                received,
                incoming: IncomingTransfers::default(),
                next_active: self.active.clone(),
            }
        };

        let resampled = migration.resampled;
        self.last_cycle = Some(assignments.cycle);
        if let Some(ctx) = self.cycle.as_mut() {
            if let Some(trace) = assignments.trace {
                ctx.trace.scan_match_ms.extend(trace.scan_match_ms);
            }
            ctx.trace.cycle = assignments.cycle;
            ctx.migration = Some(migration);
        }

        if !resampled {
            let dropped = self.pending.clear();
            if dropped > 0 {
                self.stats.messages_dropped += dropped as u64;
                log::warn!(
                    "taskId {}: Dropped {} buffered batches, cycle {} was not resampled",
                    task_id,
                    dropped,
                    assignments.cycle
                );
            }
            self.transition(MatchState::ComputingNewParticles);
            return self.finalize_cycle();
        }

        self.transition(MatchState::WaitingForNewParticles);
        self.replay_pending();
        self.try_complete()
    }

    /// Apply or buffer a map batch.
    pub fn handle_maps(&mut self, list: ParticleMapsList) -> Result<(), CoordinatorError> {
        match self.state {
            MatchState::WaitingForParticleAssignments => {
                let task_id = self.config.task_id;
                if self.is_finished_cycle(list.cycle) {
                    self.stats.messages_dropped += 1;
                    log::warn!(
                        "taskId {}: Dropping map batch from task {} for finished cycle {}",
                        task_id,
                        list.source_task,
                        list.cycle
                    );
                    return Ok(());
                }
                log::debug!(
                    "taskId {}: Buffering {} maps from task {}",
                    task_id,
                    list.maps.len(),
                    list.source_task
                );
                let source = list.source_task;
                if !self.pending.push_maps(list) {
                    self.stats.messages_dropped += 1;
                    log::warn!(
                        "taskId {}: Map buffer full, dropping batch from task {}",
                        task_id,
                        source
                    );
                }
                Ok(())
            }
            MatchState::WaitingForNewParticles => {
                self.apply_maps(list)?;
                self.try_complete()
            }
            _ => Err(self.unexpected(MessageKind::Maps)),
        }
    }

    /// Apply or buffer a value batch.
    pub fn handle_values(&mut self, values: ParticleValues) -> Result<(), CoordinatorError> {
        match self.state {
            MatchState::WaitingForParticleAssignments => {
                let task_id = self.config.task_id;
                if self.is_finished_cycle(values.cycle) {
                    self.stats.messages_dropped += 1;
                    log::warn!(
                        "taskId {}: Dropping value batch for finished cycle {}",
                        task_id,
                        values.cycle
                    );
                    return Ok(());
                }
                log::debug!(
                    "taskId {}: Buffering {} values",
                    task_id,
                    values.values.len()
                );
                if !self.pending.push_values(values) {
                    self.stats.messages_dropped += 1;
                    log::warn!("taskId {}: Value buffer full, dropping batch", task_id);
                }
                Ok(())
            }
            MatchState::WaitingForNewParticles => {
                self.apply_values(values);
                self.try_complete()
            }
            _ => Err(self.unexpected(MessageKind::Values)),
        }
    }

    fn is_finished_cycle(&self, cycle: u64) -> bool {
        self.last_cycle.is_some_and(|last| cycle <= last)
    }

    fn replay_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let (maps, values) = self.pending.drain();
        log::info!(
            "taskId {}: Replaying {} buffered map batches and {} value batches",
            self.config.task_id,
            maps.len(),
            values.len()
        );
        for list in maps {
            if let Err(e) = self.apply_maps(list) {
                log::warn!("taskId {}: Buffered map batch dropped: {}", self.config.task_id, e);
            }
        }
        for batch in values {
            self.apply_values(batch);
        }
    }

    fn apply_maps(&mut self, list: ParticleMapsList) -> Result<(), CoordinatorError> {
        let task_id = self.config.task_id;
        let Some(migration) = self.cycle.as_mut().and_then(|c| c.migration.as_mut()) else {
            return Err(CoordinatorError::InvariantViolation(
                "map batch applied with no migration in progress".into(),
            ));
        };
        if list.cycle != migration.cycle {
            self.stats.messages_dropped += 1;
            log::warn!(
                "taskId {}: Dropping map batch from task {} for cycle {} (current {})",
                task_id,
                list.source_task,
                list.cycle,
                migration.cycle
            );
            return Ok(());
        }

        let mut decoded = Vec::with_capacity(list.maps.len());
        for entry in list.maps {
            let map = match ParticleMap::from_bytes(&entry.serialized_map) {
                Ok(map) => map,
                Err(e) => {
                    self.stats.messages_dropped += 1;
                    return Err(DecodeError::new(MessageKind::ParticleMap, e).into());
                }
            };
            let poses: Vec<Pose2D> = entry.nodes.into_iter().map(Pose2D::from).collect();
            decoded.push((entry.task, entry.index, map, TrajectoryNode::from_poses(&poses)));
        }

        for (task, index, map, node) in decoded {
            if task != task_id {
                log::warn!(
                    "taskId {}: Skipping map for index {} addressed to task {}",
                    task_id,
                    index,
                    task
                );
                continue;
            }
            match migration.incoming.accept_map(index) {
                Acceptance::Applied => {
                    if let Some(particle) = self.table.get_mut(index) {
                        particle.map = Some(Arc::new(map));
                        particle.node = node;
                    }
                    migration.next_active.insert(index);
                    self.stats.maps_received += 1;
                    log::debug!(
                        "taskId {}: Map for index {} applied, expecting {} maps",
                        task_id,
                        index,
                        migration.incoming.expecting_maps()
                    );
                }
                Acceptance::Duplicate => log::warn!(
                    "taskId {}: Duplicate map for index {} in cycle {} ignored",
                    task_id,
                    index,
                    migration.cycle
                ),
                Acceptance::Unexpected => log::warn!(
                    "taskId {}: Unexpected map for index {} in cycle {} ignored",
                    task_id,
                    index,
                    migration.cycle
                ),
            }
        }
        Ok(())
    }

    fn apply_values(&mut self, batch: ParticleValues) {
        let task_id = self.config.task_id;
        let Some(migration) = self.cycle.as_mut().and_then(|c| c.migration.as_mut()) else {
            return;
        };
        if batch.cycle != migration.cycle {
            self.stats.messages_dropped += 1;
            log::warn!(
                "taskId {}: Dropping value batch for cycle {} (current {})",
                task_id,
                batch.cycle,
                migration.cycle
            );
            return;
        }

        for value in batch.values {
            if value.task_id != task_id {
                log::warn!(
                    "taskId {}: Skipping value for index {} addressed to task {}",
                    task_id,
                    value.index,
                    value.task_id
                );
                continue;
            }
            match migration.incoming.accept_value(value.index) {
                Acceptance::Applied => {
                    if let Some(particle) = self.table.get_mut(value.index) {
                        particle.pose = pose_or_identity(value.pose);
                        particle.weight = value.weight;
                    }
                    migration.next_active.insert(value.index);
                    self.stats.values_received += 1;
                }
                Acceptance::Duplicate => log::warn!(
                    "taskId {}: Duplicate value for index {} in cycle {} ignored",
                    task_id,
                    value.index,
                    migration.cycle
                ),
                Acceptance::Unexpected => log::warn!(
                    "taskId {}: Unexpected value for index {} in cycle {} ignored",
                    task_id,
                    value.index,
                    migration.cycle
                ),
            }
        }
    }

    fn try_complete(&mut self) -> Result<(), CoordinatorError> {
        if self.state != MatchState::WaitingForNewParticles {
            return Ok(());
        }
        let complete = self.migration().is_some_and(|m| m.incoming.is_complete());
        if !complete {
            return Ok(());
        }
        self.transition(MatchState::ComputingNewParticles);
        self.finalize_cycle()
    }

    fn finalize_cycle(&mut self) -> Result<(), CoordinatorError> {
        let task_id = self.config.task_id;
        let Some(CycleContext {
            scan,
            sensor_id,
            started,
            mut trace,
            migration: Some(migration),
        }) = self.cycle.take()
        else {
            let err = CoordinatorError::InvariantViolation("finalize with no migration".into());
            self.abort_cycle(&err);
            return Err(err);
        };

        let post_start = Instant::now();
        if migration.resampled {
            self.active = migration.next_active;
            self.matcher
                .after_resampling(&scan, &mut self.table, &self.active);
        } else {
            self.matcher
                .without_resampling(&scan, &mut self.table, &self.active);
        }
        let post_process = post_start.elapsed();

        if self.active.contains(&migration.best_particle_index) {
            trace.assignment_to_emit_ms = elapsed_ms(migration.received);
            trace.scan_to_emit_ms = elapsed_ms(started);
            trace.post_process_ms = duration_ms(post_process);
            trace.cycle = migration.cycle;
            self.emit_best(&scan, sensor_id, &trace, migration.best_particle_index);
        }

        let released = self.table.clear_inactive(&self.active);
        self.stats.particles_released += released as u64;
        self.stats.cycles_completed += 1;
        log::info!(
            "taskId {}: Cycle {} complete, {} active particles, {} released",
            task_id,
            migration.cycle,
            self.active.len(),
            released
        );
        self.change_to_ready()
    }

    fn emit_best(&mut self, scan: &LaserScan, sensor_id: String, trace: &Trace, index: u32) {
        let task_id = self.config.task_id;
        let Some(best) = self.table.get(index) else {
            return;
        };
        let msg = BestParticle {
            trace: encode(trace),
            sensor_id,
            timestamp_us: scan.timestamp_us,
            task_id,
            index,
            pose: Some(best.pose.into()),
        };
        match self.transport.send(Route::BestParticle, encode(&msg)) {
            Ok(()) => {
                self.stats.best_particles_emitted += 1;
                log::debug!("taskId {}: Emitted best particle {}", task_id, index);
            }
            Err(e) => log::error!("taskId {}: Best particle not emitted: {}", task_id, e),
        }
    }

    /// Drop the cycle in progress and return to `WAITING_FOR_READING`.
    fn abort_cycle(&mut self, reason: &CoordinatorError) {
        let task_id = self.config.task_id;
        let dropped = self.pending.clear();
        self.cycle = None;
        self.stats.cycles_aborted += 1;
        log::error!(
            "taskId {}: Aborting cycle in state {}: {} ({} buffered batches dropped)",
            task_id,
            self.state,
            reason,
            dropped
        );
        self.state = MatchState::WaitingForReading;
        if let Err(e) = self.send_ready() {
            log::error!("taskId {}: Ready not sent after abort: {}", task_id, e);
        }
    }

    fn change_to_ready(&mut self) -> Result<(), CoordinatorError> {
        self.transition(MatchState::WaitingForReading);
        self.send_ready()
    }

    fn send_ready(&self) -> Result<(), CoordinatorError> {
        let ready = Ready {
            task_id: self.config.task_id,
        };
        self.transport.send(Route::Ready, encode(&ready))?;
        Ok(())
    }

    fn unexpected(&mut self, kind: MessageKind) -> CoordinatorError {
        self.stats.messages_dropped += 1;
        CoordinatorError::UnexpectedMessage {
            kind,
            state: self.state,
        }
    }

    fn transition(&mut self, next: MatchState) {
        if !self.state.is_cycle_transition(next) {
            log::warn!(
                "taskId {}: Unexpected transition {} -> {}",
                self.config.task_id,
                self.state,
                next
            );
        }
        log::info!("taskId {}: Changing state to {}", self.config.task_id, next);
        self.state = next;
    }
}

#[inline]
fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[inline]
fn elapsed_ms(since: Instant) -> i64 {
    duration_ms(since.elapsed())
}
