//! Inbound channels of one coordinator task.
//!
//! Transport threads call into [`CoordinatorInbox`] from any thread; the
//! coordinator actor owns the matching [`InboxReceivers`] and is the only
//! consumer, so all coordinator state is single-writer.
//!
//! Scans go through a small bounded channel and are dropped when it is full:
//! a scan that cannot be processed right away would be discarded by the state
//! machine anyway. Assignment, map and value channels are unbounded so that a
//! dispatch worker never blocks on a peer that is itself waiting in its own
//! dispatch join.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};

use super::transport::{Route, TransportError};

/// Channel capacity for scans (small to avoid queueing stale readings).
const SCAN_CHANNEL_CAPACITY: usize = 4;

/// Channel capacity for control requests.
const CONTROL_CHANNEL_CAPACITY: usize = 4;

/// One inbound payload, still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Scan(Vec<u8>),
    Assignments(Vec<u8>),
    Maps(Vec<u8>),
    Values(Vec<u8>),
    /// Re-run initialization and drop all particle state
    Reset,
}

/// Sender side, cloned into every transport thread.
#[derive(Debug, Clone)]
pub struct CoordinatorInbox {
    task_id: u32,
    scan_tx: Sender<Vec<u8>>,
    assignment_tx: Sender<Vec<u8>>,
    map_tx: Sender<Vec<u8>>,
    value_tx: Sender<Vec<u8>>,
    control_tx: Sender<()>,
}

/// Receiver side, owned by the coordinator actor.
#[derive(Debug)]
pub struct InboxReceivers {
    pub scan_rx: Receiver<Vec<u8>>,
    pub assignment_rx: Receiver<Vec<u8>>,
    pub map_rx: Receiver<Vec<u8>>,
    pub value_rx: Receiver<Vec<u8>>,
    pub control_rx: Receiver<()>,
}

/// Create the inbound channel set for `task_id`.
pub fn create_inbox(task_id: u32) -> (CoordinatorInbox, InboxReceivers) {
    let (scan_tx, scan_rx) = bounded(SCAN_CHANNEL_CAPACITY);
    let (assignment_tx, assignment_rx) = unbounded();
    let (map_tx, map_rx) = unbounded();
    let (value_tx, value_rx) = unbounded();
    let (control_tx, control_rx) = bounded(CONTROL_CHANNEL_CAPACITY);

    (
        CoordinatorInbox {
            task_id,
            scan_tx,
            assignment_tx,
            map_tx,
            value_tx,
            control_tx,
        },
        InboxReceivers {
            scan_rx,
            assignment_rx,
            map_rx,
            value_rx,
            control_rx,
        },
    )
}

impl CoordinatorInbox {
    /// Task this inbox feeds.
    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    /// Deliver a scan, dropping it if the coordinator is backed up.
    pub fn deliver_scan(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let route = Route::Scan { task: self.task_id };
        self.scan_tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Full(route),
            TrySendError::Disconnected(_) => TransportError::Disconnected(route),
        })
    }

    pub fn deliver_assignments(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.assignment_tx
            .send(payload)
            .map_err(|_| TransportError::Disconnected(Route::Assignments { task: self.task_id }))
    }

    pub fn deliver_maps(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.map_tx
            .send(payload)
            .map_err(|_| TransportError::Disconnected(Route::Maps { task: self.task_id }))
    }

    pub fn deliver_values(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.value_tx
            .send(payload)
            .map_err(|_| TransportError::Disconnected(Route::Values { task: self.task_id }))
    }

    /// Ask the coordinator to re-initialize. A pending request absorbs repeats.
    pub fn request_reset(&self) -> Result<(), TransportError> {
        match self.control_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Disconnected(())) => {
                Err(TransportError::Disconnected(Route::Control { task: self.task_id }))
            }
        }
    }

    /// Deliver any inbound payload to its channel.
    pub fn deliver(&self, inbound: Inbound) -> Result<(), TransportError> {
        match inbound {
            Inbound::Scan(payload) => self.deliver_scan(payload),
            Inbound::Assignments(payload) => self.deliver_assignments(payload),
            Inbound::Maps(payload) => self.deliver_maps(payload),
            Inbound::Values(payload) => self.deliver_values(payload),
            Inbound::Reset => self.request_reset(),
        }
    }
}
