//! In-process transport connecting every task of a local cluster.
//!
//! Routes per-task traffic into the task's [`CoordinatorInbox`] and the
//! cluster-wide streams (summaries, best particle, ready) into channels owned
//! by the planner and the driver.

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::inbox::CoordinatorInbox;
use super::transport::{Route, Transport, TransportError};

/// Loopback [`Transport`] over crossbeam channels.
#[derive(Debug, Clone)]
pub struct LocalHub {
    inboxes: Vec<CoordinatorInbox>,
    summaries_tx: Sender<Vec<u8>>,
    best_tx: Sender<Vec<u8>>,
    ready_tx: Sender<Vec<u8>>,
}

/// Cluster-wide output streams of a [`LocalHub`].
#[derive(Debug)]
pub struct HubReceivers {
    /// Encoded `ParticleSummaries`, consumed by the planner
    pub summaries_rx: Receiver<Vec<u8>>,
    /// Encoded `BestParticle`
    pub best_rx: Receiver<Vec<u8>>,
    /// Encoded `Ready`
    pub ready_rx: Receiver<Vec<u8>>,
}

impl LocalHub {
    /// Create a hub. `inboxes[i]` must belong to task `i`.
    pub fn new(mut inboxes: Vec<CoordinatorInbox>) -> (Self, HubReceivers) {
        inboxes.sort_by_key(|inbox| inbox.task_id());
        let (summaries_tx, summaries_rx) = unbounded();
        let (best_tx, best_rx) = unbounded();
        let (ready_tx, ready_rx) = unbounded();
        (
            Self {
                inboxes,
                summaries_tx,
                best_tx,
                ready_tx,
            },
            HubReceivers {
                summaries_rx,
                best_rx,
                ready_rx,
            },
        )
    }

    /// Number of connected tasks.
    pub fn tasks(&self) -> u32 {
        self.inboxes.len() as u32
    }

    /// Inbox of a task.
    pub fn inbox(&self, task: u32) -> Result<&CoordinatorInbox, TransportError> {
        self.inboxes
            .get(task as usize)
            .filter(|inbox| inbox.task_id() == task)
            .ok_or(TransportError::UnknownTask(task))
    }

    /// Deliver the same scan to every task. Returns how many accepted it.
    pub fn broadcast_scan(&self, payload: &[u8]) -> usize {
        self.inboxes
            .iter()
            .filter(|inbox| match inbox.deliver_scan(payload.to_vec()) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Scan not delivered to task {}: {}", inbox.task_id(), e);
                    false
                }
            })
            .count()
    }

    /// Ask every task to re-initialize.
    pub fn broadcast_reset(&self) -> Result<(), TransportError> {
        for inbox in &self.inboxes {
            inbox.request_reset()?;
        }
        Ok(())
    }
}

impl Transport for LocalHub {
    fn send(&self, route: Route, payload: Vec<u8>) -> Result<(), TransportError> {
        match route {
            Route::Scan { task } => self.inbox(task)?.deliver_scan(payload),
            Route::Assignments { task } => self.inbox(task)?.deliver_assignments(payload),
            Route::Maps { task } => self.inbox(task)?.deliver_maps(payload),
            Route::Values { task } => self.inbox(task)?.deliver_values(payload),
            Route::Control { task } => self.inbox(task)?.request_reset(),
            Route::Summaries => self
                .summaries_tx
                .send(payload)
                .map_err(|_| TransportError::Disconnected(route)),
            Route::BestParticle => self
                .best_tx
                .send(payload)
                .map_err(|_| TransportError::Disconnected(route)),
            Route::Ready => self
                .ready_tx
                .send(payload)
                .map_err(|_| TransportError::Disconnected(route)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::inbox::create_inbox;

    #[test]
    fn test_routes_to_task_inbox() {
        let (inbox0, rx0) = create_inbox(0);
        let (inbox1, rx1) = create_inbox(1);
        let (hub, _outputs) = LocalHub::new(vec![inbox1, inbox0]);

        hub.send(Route::Maps { task: 1 }, vec![7]).unwrap();
        hub.send(Route::Values { task: 0 }, vec![8]).unwrap();

        assert_eq!(rx1.map_rx.try_recv().unwrap(), vec![7]);
        assert_eq!(rx0.value_rx.try_recv().unwrap(), vec![8]);
        assert!(rx0.map_rx.is_empty());
    }

    #[test]
    fn test_unknown_task() {
        let (inbox0, _rx0) = create_inbox(0);
        let (hub, _outputs) = LocalHub::new(vec![inbox0]);
        assert_eq!(
            hub.send(Route::Assignments { task: 3 }, vec![]),
            Err(TransportError::UnknownTask(3))
        );
    }

    #[test]
    fn test_cluster_streams() {
        let (inbox0, _rx0) = create_inbox(0);
        let (hub, outputs) = LocalHub::new(vec![inbox0]);
        hub.send(Route::Ready, vec![1]).unwrap();
        hub.send(Route::Summaries, vec![2]).unwrap();
        assert_eq!(outputs.ready_rx.try_recv().unwrap(), vec![1]);
        assert_eq!(outputs.summaries_rx.try_recv().unwrap(), vec![2]);

        drop(outputs);
        assert_eq!(
            hub.send(Route::BestParticle, vec![]),
            Err(TransportError::Disconnected(Route::BestParticle))
        );
    }

    #[test]
    fn test_broadcast_scan() {
        let (inbox0, rx0) = create_inbox(0);
        let (inbox1, rx1) = create_inbox(1);
        let (hub, _outputs) = LocalHub::new(vec![inbox0, inbox1]);
        assert_eq!(hub.broadcast_scan(&[9, 9]), 2);
        assert_eq!(rx0.scan_rx.len(), 1);
        assert_eq!(rx1.scan_rx.len(), 1);
    }
}
