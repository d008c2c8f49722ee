//! Coordinator Thread - single-owner actor for one task.
//!
//! This thread:
//! - Owns the task's `ResamplingCoordinator` exclusively
//! - Waits on the five inbound channels with `select!`
//! - Hands each message to the coordinator, one at a time
//!
//! Transport threads never touch coordinator state; they only push encoded
//! payloads into the task's `CoordinatorInbox`.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::select;

use super::POLL_INTERVAL;
use crate::engine::{CoordinatorStats, LocalScanMatcher, ResamplingCoordinator};
use crate::io::{Inbound, InboxReceivers};

/// Coordinator thread handle.
pub struct CoordinatorThread {
    task_id: u32,
    handle: JoinHandle<CoordinatorStats>,
}

impl CoordinatorThread {
    /// Spawn the actor for `coordinator`.
    pub fn spawn<M: LocalScanMatcher + 'static>(
        coordinator: ResamplingCoordinator<M>,
        receivers: InboxReceivers,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let task_id = coordinator.task_id();
        let handle = thread::Builder::new()
            .name(format!("coordinator-{task_id}"))
            .spawn(move || run_loop(coordinator, receivers, running))?;
        Ok(Self { task_id, handle })
    }

    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    /// Wait for the thread to finish. Returns the coordinator's final counters.
    pub fn join(self) -> thread::Result<CoordinatorStats> {
        self.handle.join()
    }
}

enum Event {
    Message(Inbound),
    Idle,
    Disconnected,
}

fn run_loop<M: LocalScanMatcher>(
    mut coordinator: ResamplingCoordinator<M>,
    receivers: InboxReceivers,
    running: Arc<AtomicBool>,
) -> CoordinatorStats {
    let task_id = coordinator.task_id();
    log::info!("taskId {}: Coordinator thread starting", task_id);

    while running.load(Ordering::Relaxed) {
        let event = select! {
            recv(receivers.control_rx) -> msg => msg.map_or(Event::Disconnected, |()| Event::Message(Inbound::Reset)),
            recv(receivers.assignment_rx) -> msg => msg.map_or(Event::Disconnected, |m| Event::Message(Inbound::Assignments(m))),
            recv(receivers.map_rx) -> msg => msg.map_or(Event::Disconnected, |m| Event::Message(Inbound::Maps(m))),
            recv(receivers.value_rx) -> msg => msg.map_or(Event::Disconnected, |m| Event::Message(Inbound::Values(m))),
            recv(receivers.scan_rx) -> msg => msg.map_or(Event::Disconnected, |m| Event::Message(Inbound::Scan(m))),
            default(POLL_INTERVAL) => Event::Idle,
        };

        match event {
            Event::Message(inbound) => {
                if let Err(e) = coordinator.handle_inbound(inbound) {
                    if e.is_transient() {
                        log::warn!("taskId {}: {}", task_id, e);
                    } else {
                        log::error!("taskId {}: {}", task_id, e);
                    }
                }
            }
            Event::Idle => {}
            Event::Disconnected => {
                log::info!("taskId {}: Inbox closed", task_id);
                break;
            }
        }
    }

    log::info!(
        "taskId {}: Coordinator thread stopped in state {}",
        task_id,
        coordinator.state()
    );
    coordinator.stats().clone()
}
