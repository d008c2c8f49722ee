//! Particle state owned by one coordinator task.
//!
//! - [`ParticleMap`]: opaque occupancy payload, serialized for migration
//! - [`TrajectoryNode`]: ancestor chain of poses, shared with `Arc`
//! - [`Particle`] / [`ParticleTable`]: dense table of every global index
//! - [`Partition`]: deterministic initial split of indices across tasks

mod map;
mod node;
mod particle;
mod partition;

pub use map::{MAX_CELLS, MapError, ParticleMap, grid_cells};
pub use node::{Ancestors, TrajectoryNode};
pub use particle::{ActiveParticles, Particle, ParticleTable};
pub use partition::{Partition, PartitionError};
