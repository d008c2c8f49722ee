//! Particle and the dense particle table.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::map::ParticleMap;
use super::node::TrajectoryNode;
use crate::core::types::Pose2D;

/// Indices a task currently maintains.
pub type ActiveParticles = BTreeSet<u32>;

/// One weighted pose + map hypothesis.
#[derive(Debug, Clone)]
pub struct Particle {
    /// Global index, stable until the particle migrates.
    pub index: u32,
    /// Current pose estimate.
    pub pose: Pose2D,
    /// Importance weight (unnormalized).
    pub weight: f64,
    /// Map payload, `None` when the index is not active on this task.
    pub map: Option<Arc<ParticleMap>>,
    /// Trajectory leaf, owned together with the map.
    pub node: Option<Arc<TrajectoryNode>>,
}

impl Particle {
    /// Create an empty particle slot.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            pose: Pose2D::identity(),
            weight: 1.0,
            map: None,
            node: None,
        }
    }

    /// Mutable access to the map, copying it first if another index shares it.
    pub fn map_mut(&mut self) -> Option<&mut ParticleMap> {
        self.map.as_mut().map(Arc::make_mut)
    }

    /// Append a pose to the trajectory, starting one if needed.
    pub fn push_pose(&mut self, pose: Pose2D) {
        self.node = Some(match &self.node {
            Some(leaf) => leaf.extend(pose),
            None => TrajectoryNode::root(pose),
        });
    }

    /// Release the heavy state of this slot.
    pub fn clear(&mut self) {
        self.map = None;
        self.node = None;
    }

    /// True if neither map nor trajectory is held.
    pub fn is_cleared(&self) -> bool {
        self.map.is_none() && self.node.is_none()
    }
}

/// Every global particle index, active on this task or not.
#[derive(Debug, Clone, Default)]
pub struct ParticleTable {
    particles: Vec<Particle>,
}

impl ParticleTable {
    /// Create `total` empty slots.
    pub fn new(total: u32) -> Self {
        Self {
            particles: (0..total).map(Particle::new).collect(),
        }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Get a particle by global index.
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Particle> {
        self.particles.get(index as usize)
    }

    /// Get a particle mutably by global index.
    #[inline]
    pub fn get_mut(&mut self, index: u32) -> Option<&mut Particle> {
        self.particles.get_mut(index as usize)
    }

    /// Iterate all slots.
    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    /// Iterate the slots listed in `active`.
    pub fn active_mut<'a>(
        &'a mut self,
        active: &'a ActiveParticles,
    ) -> impl Iterator<Item = &'a mut Particle> + 'a {
        self.particles
            .iter_mut()
            .filter(move |p| active.contains(&p.index))
    }

    /// Drop map and trajectory of every index outside `active`.
    ///
    /// Returns how many slots were released.
    pub fn clear_inactive(&mut self, active: &ActiveParticles) -> usize {
        let mut released = 0;
        for particle in &mut self.particles {
            if !active.contains(&particle.index) && !particle.is_cleared() {
                particle.clear();
                released += 1;
            }
        }
        released
    }
}
