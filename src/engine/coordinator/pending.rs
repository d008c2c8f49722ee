//! Early map and value batches held until the assignment broadcast arrives.

use std::mem;

use crate::io::messages::{ParticleMapsList, ParticleValues};

/// Batches held per peer and kind before further ones are refused.
pub const BATCHES_PER_PEER: usize = 4;

/// Per-kind arrival-ordered buffers, each capped at `limit` batches.
#[derive(Debug)]
pub struct PendingBuffers {
    maps: Vec<ParticleMapsList>,
    values: Vec<ParticleValues>,
    limit: usize,
}

impl PendingBuffers {
    /// Buffers sized for a cluster of `tasks` peers.
    pub fn for_tasks(tasks: u32) -> Self {
        Self::with_limit((tasks.max(1) as usize).saturating_mul(BATCHES_PER_PEER))
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            maps: Vec::new(),
            values: Vec::new(),
            limit,
        }
    }

    /// Buffer a map batch. Returns false when the buffer is full.
    pub fn push_maps(&mut self, list: ParticleMapsList) -> bool {
        if self.maps.len() >= self.limit {
            return false;
        }
        self.maps.push(list);
        true
    }

    /// Buffer a value batch. Returns false when the buffer is full.
    pub fn push_values(&mut self, values: ParticleValues) -> bool {
        if self.values.len() >= self.limit {
            return false;
        }
        self.values.push(values);
        true
    }

    /// Buffered (map, value) batch counts.
    pub fn counts(&self) -> (usize, usize) {
        (self.maps.len(), self.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty() && self.values.is_empty()
    }

    /// Take both buffers, each in arrival order.
    pub fn drain(&mut self) -> (Vec<ParticleMapsList>, Vec<ParticleValues>) {
        (mem::take(&mut self.maps), mem::take(&mut self.values))
    }

    /// Discard everything. Returns how many batches were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.maps.len() + self.values.len();
        self.maps.clear();
        self.values.clear();
        dropped
    }
}
