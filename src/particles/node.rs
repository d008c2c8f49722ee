//! Trajectory history of a particle.
//!
//! Each node points at its parent, so particles that were resampled from a
//! common ancestor share the older part of their chain.

use std::sync::Arc;

use crate::core::types::Pose2D;

/// One pose in a particle's trajectory.
#[derive(Debug)]
pub struct TrajectoryNode {
    pose: Pose2D,
    parent: Option<Arc<TrajectoryNode>>,
    depth: usize,
}

impl TrajectoryNode {
    /// Start a new chain.
    pub fn root(pose: Pose2D) -> Arc<Self> {
        Arc::new(Self {
            pose,
            parent: None,
            depth: 1,
        })
    }

    /// Append a pose, returning the new leaf.
    pub fn extend(self: &Arc<Self>, pose: Pose2D) -> Arc<Self> {
        Arc::new(Self {
            pose,
            parent: Some(Arc::clone(self)),
            depth: self.depth + 1,
        })
    }

    /// Pose stored at this node.
    #[inline]
    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Previous node, if any.
    #[inline]
    pub fn parent(&self) -> Option<&Arc<TrajectoryNode>> {
        self.parent.as_ref()
    }

    /// Number of nodes from the root to this node, inclusive.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Walk from this node back to the root.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Flatten the chain into root-first order for transfer.
    pub fn to_poses(&self) -> Vec<Pose2D> {
        let mut poses: Vec<Pose2D> = self.ancestors().map(|n| n.pose).collect();
        poses.reverse();
        poses
    }

    /// Rebuild a chain from root-first poses. Returns `None` for an empty list.
    pub fn from_poses(poses: &[Pose2D]) -> Option<Arc<Self>> {
        let (first, rest) = poses.split_first()?;
        Some(
            rest.iter()
                .fold(Self::root(*first), |leaf, pose| leaf.extend(*pose)),
        )
    }
}

// Unlink iteratively; the default recursive drop overflows the stack on
// long trajectories.
impl Drop for TrajectoryNode {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => next = inner.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator from a node back to the root of its chain.
pub struct Ancestors<'a> {
    next: Option<&'a TrajectoryNode>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a TrajectoryNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        self.next = node.parent.as_deref();
        Some(node)
    }
}
