//! Bounded fan-out of outbound map batches.
//!
//! A fixed set of worker threads pulls jobs from a shared crossbeam channel.
//! [`DispatchPool::dispatch`] submits one job per destination task, then
//! waits until every one of them has been accepted by the transport (or has
//! failed). This wait is the only blocking step of a migration.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use thiserror::Error;

use crate::io::codec::encode;
use crate::io::messages::ParticleMapsList;
use crate::io::transport::{Route, Transport, TransportError};

/// Map transfers bound for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundBatch {
    /// Destination task
    pub task: u32,
    pub list: ParticleMapsList,
}

/// Dispatch errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("sending map batch to task {task} failed: {source}")]
    Send {
        task: u32,
        #[source]
        source: TransportError,
    },

    #[error("dispatch wait interrupted: {0}")]
    Interrupted(String),

    #[error("dispatch timed out after {timeout:?} with {outstanding} batches outstanding")]
    TimedOut {
        timeout: Duration,
        outstanding: usize,
    },
}

struct Job {
    batch: OutboundBatch,
    done: Sender<Result<u32, DispatchError>>,
}

/// Fixed-size pool of dispatch workers.
pub struct DispatchPool {
    job_tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl DispatchPool {
    /// Spawn `workers` threads sending through `transport`.
    ///
    /// With `timeout = None` a dispatch waits until every batch completes.
    pub fn new(
        name: &str,
        workers: usize,
        transport: Arc<dyn Transport>,
        timeout: Option<Duration>,
    ) -> io::Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let workers = (0..workers.max(1))
            .map(|i| {
                let job_rx = job_rx.clone();
                let transport = Arc::clone(&transport);
                thread::Builder::new()
                    .name(format!("{name}-dispatch-{i}"))
                    .spawn(move || run_worker(job_rx, transport))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self {
            job_tx: Some(job_tx),
            workers,
            timeout,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Send every batch and wait for all of them.
    ///
    /// Returns the number of batches sent, or the first failure once every
    /// job has reported back.
    pub fn dispatch(&self, batches: Vec<OutboundBatch>) -> Result<usize, DispatchError> {
        let total = batches.len();
        if total == 0 {
            return Ok(0);
        }
        let job_tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| DispatchError::Interrupted("pool is shut down".into()))?;

        let (done_tx, done_rx) = bounded(total);
        for batch in batches {
            job_tx
                .send(Job {
                    batch,
                    done: done_tx.clone(),
                })
                .map_err(|_| DispatchError::Interrupted("no dispatch workers".into()))?;
        }
        // Only job copies remain; if every worker drops its job unfinished the
        // wait below sees a disconnect instead of hanging.
        drop(done_tx);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut first_error = None;
        for received in 0..total {
            let result = match (deadline, self.timeout) {
                (Some(deadline), Some(timeout)) => {
                    done_rx.recv_deadline(deadline).map_err(|e| match e {
                        RecvTimeoutError::Timeout => DispatchError::TimedOut {
                            timeout,
                            outstanding: total - received,
                        },
                        RecvTimeoutError::Disconnected => disconnected(total - received),
                    })?
                }
                _ => done_rx.recv().map_err(|_| disconnected(total - received))?,
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(total),
        }
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        self.job_tx.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Dispatch worker panicked");
            }
        }
    }
}

fn disconnected(outstanding: usize) -> DispatchError {
    DispatchError::Interrupted(format!("{outstanding} batches lost by workers"))
}

fn run_worker(job_rx: Receiver<Job>, transport: Arc<dyn Transport>) {
    while let Ok(Job { batch, done }) = job_rx.recv() {
        let task = batch.task;
        let entries = batch.list.maps.len();
        let result = transport
            .send(Route::Maps { task }, encode(&batch.list))
            .map(|()| task)
            .map_err(|source| DispatchError::Send { task, source });
        match &result {
            Ok(_) => log::debug!("Sent {} maps to task {}", entries, task),
            Err(e) => log::warn!("{}", e),
        }
        // The dispatcher may have given up on a timeout.
        let _ = done.send(result);
    }
}
