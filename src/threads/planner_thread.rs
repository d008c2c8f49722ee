//! Planner Thread - global resampling decisions.
//!
//! This thread:
//! - Collects `ParticleSummaries` from every task, grouped by scan timestamp
//! - Runs the `AssignmentPlanner` once all tasks have reported for a scan
//! - Sends each task its value batch, then broadcasts the assignments

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use super::POLL_INTERVAL;
use crate::engine::{AssignmentPlanner, values_for_assignments};
use crate::io::codec::{MessageKind, decode, encode};
use crate::io::messages::{ParticleAssignments, ParticleSummaries};
use crate::io::{Route, Transport};

/// Planner thread handle.
pub struct PlannerThread {
    handle: JoinHandle<u64>,
}

impl PlannerThread {
    /// Spawn the planner for a cluster of `tasks` tasks.
    pub fn spawn<P: AssignmentPlanner + 'static>(
        planner: P,
        tasks: u32,
        summaries_rx: Receiver<Vec<u8>>,
        transport: Arc<dyn Transport>,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new()
            .name("planner".into())
            .spawn(move || run_loop(planner, tasks, summaries_rx, transport, running))?;
        Ok(Self { handle })
    }

    /// Wait for the thread to finish. Returns the number of cycles planned.
    pub fn join(self) -> thread::Result<u64> {
        self.handle.join()
    }
}

fn run_loop<P: AssignmentPlanner>(
    mut planner: P,
    tasks: u32,
    summaries_rx: Receiver<Vec<u8>>,
    transport: Arc<dyn Transport>,
    running: Arc<AtomicBool>,
) -> u64 {
    log::info!("Planner thread starting ({} tasks)", tasks);
    let mut rounds = RoundCollector::new(tasks);
    let mut planned = 0;

    while running.load(Ordering::Relaxed) {
        let payload = match summaries_rx.recv_timeout(POLL_INTERVAL) {
            Ok(payload) => payload,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let summaries: ParticleSummaries = match decode(MessageKind::Summaries, &payload) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Planner: {}", e);
                continue;
            }
        };
        let Some(round) = rounds.add(summaries) else {
            continue;
        };

        let assignments = planner.plan(&round);
        publish(transport.as_ref(), tasks, &round, &assignments);
        planned += 1;
    }

    log::info!("Planner thread stopped after {} cycles", planned);
    planned
}

fn publish(
    transport: &dyn Transport,
    tasks: u32,
    round: &[ParticleSummaries],
    assignments: &ParticleAssignments,
) {
    // No ordering between value batches and the assignment broadcast
    for (task, batch) in values_for_assignments(round, assignments) {
        if let Err(e) = transport.send(Route::Values { task }, encode(&batch)) {
            log::warn!("Planner: values for task {} not sent: {}", task, e);
        }
    }
    let payload = encode(assignments);
    for task in 0..tasks {
        if let Err(e) = transport.send(Route::Assignments { task }, payload.clone()) {
            log::warn!("Planner: assignments for task {} not sent: {}", task, e);
        }
    }
}

/// Groups summaries by scan until every task has reported.
struct RoundCollector {
    tasks: u32,
    rounds: BTreeMap<u64, BTreeMap<u32, ParticleSummaries>>,
}

impl RoundCollector {
    fn new(tasks: u32) -> Self {
        Self {
            tasks,
            rounds: BTreeMap::new(),
        }
    }

    /// Add one task's summaries. Returns the full round once complete.
    fn add(&mut self, summaries: ParticleSummaries) -> Option<Vec<ParticleSummaries>> {
        let key = summaries.scan.as_ref().map_or(0, |s| s.timestamp_us);
        let round = self.rounds.entry(key).or_default();
        if round.insert(summaries.task_id, summaries).is_some() {
            log::warn!("Planner: duplicate summaries for scan {}", key);
        }
        if round.len() < self.tasks as usize {
            return None;
        }

        let complete = self.rounds.remove(&key)?;
        let stale: Vec<u64> = self.rounds.range(..key).map(|(k, _)| *k).collect();
        for k in stale {
            if let Some(r) = self.rounds.remove(&k) {
                log::warn!(
                    "Planner: dropping incomplete round for scan {} ({} of {} tasks)",
                    k,
                    r.len(),
                    self.tasks
                );
            }
        }
        Some(complete.into_values().collect())
    }

    #[cfg(test)]
    fn open_rounds(&self) -> usize {
        self.rounds.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::messages::LaserScanMsg;

    fn summaries(task_id: u32, timestamp_us: u64) -> ParticleSummaries {
        ParticleSummaries {
            task_id,
            scan: Some(LaserScanMsg {
                timestamp_us,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_completes_with_all_tasks() {
        let mut rounds = RoundCollector::new(3);
        assert!(rounds.add(summaries(2, 10)).is_none());
        assert!(rounds.add(summaries(0, 10)).is_none());
        let round = rounds.add(summaries(1, 10)).unwrap();
        assert_eq!(
            round.iter().map(|s| s.task_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(rounds.open_rounds(), 0);
    }

    #[test]
    fn test_duplicate_task_does_not_complete_round() {
        let mut rounds = RoundCollector::new(2);
        assert!(rounds.add(summaries(0, 10)).is_none());
        assert!(rounds.add(summaries(0, 10)).is_none());
        assert!(rounds.add(summaries(1, 10)).is_some());
    }

    #[test]
    fn test_older_incomplete_rounds_dropped() {
        let mut rounds = RoundCollector::new(2);
        rounds.add(summaries(0, 5));
        rounds.add(summaries(0, 10));
        assert!(rounds.add(summaries(1, 10)).is_some());
        assert_eq!(rounds.open_rounds(), 0);
    }
}
