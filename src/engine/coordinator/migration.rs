//! Migration planning for one resampled cycle.
//!
//! [`plan_migration`] turns the broadcast assignment list into everything
//! this task has to do: outbound map batches, local reference copies, and
//! the set of inbound transfers it must wait for. It validates the whole
//! list before producing anything, so a rejected list leaves no trace.
//!
//! Per assignment, from this task's point of view:
//!
//! | previous_task | new_task | action |
//! |---|---|---|
//! | self | self | copy map/node reference to `new_index`, expect one value |
//! | self | other | serialize once per `previous_index`, batch per `new_task` |
//! | other | self | expect one map and one value for `new_index` |

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use super::error::CoordinatorError;
use crate::engine::dispatch::OutboundBatch;
use crate::io::messages::{ParticleAssignments, ParticleMaps, ParticleMapsList, PoseMsg};
use crate::particles::{ActiveParticles, ParticleMap, ParticleTable, TrajectoryNode};

/// Reference copy of a particle that stays on this task.
#[derive(Debug, Clone)]
pub struct LocalCopy {
    pub previous_index: u32,
    pub new_index: u32,
    pub map: Option<Arc<ParticleMap>>,
    pub node: Option<Arc<TrajectoryNode>>,
}

/// Outcome of applying one inbound entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// First arrival for an expected index
    Applied,
    /// Index already applied this cycle
    Duplicate,
    /// Index not expected this cycle
    Unexpected,
}

/// Inbound transfers this task waits for in one cycle.
///
/// Each expected index is applied at most once per kind, so the remaining
/// counts only ever go down and never below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncomingTransfers {
    expected_maps: BTreeSet<u32>,
    expected_values: BTreeSet<u32>,
    remaining_maps: BTreeSet<u32>,
    remaining_values: BTreeSet<u32>,
}

impl IncomingTransfers {
    fn expect_map(&mut self, index: u32) {
        self.expected_maps.insert(index);
        self.remaining_maps.insert(index);
    }

    fn expect_value(&mut self, index: u32) {
        self.expected_values.insert(index);
        self.remaining_values.insert(index);
    }

    /// Record a map arrival for `index`.
    pub fn accept_map(&mut self, index: u32) -> Acceptance {
        accept(&self.expected_maps, &mut self.remaining_maps, index)
    }

    /// Record a value arrival for `index`.
    pub fn accept_value(&mut self, index: u32) -> Acceptance {
        accept(&self.expected_values, &mut self.remaining_values, index)
    }

    /// Maps still outstanding.
    pub fn expecting_maps(&self) -> usize {
        self.remaining_maps.len()
    }

    /// Values still outstanding.
    pub fn expecting_values(&self) -> usize {
        self.remaining_values.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_maps.is_empty() && self.remaining_values.is_empty()
    }
}

fn accept(expected: &BTreeSet<u32>, remaining: &mut BTreeSet<u32>, index: u32) -> Acceptance {
    if !expected.contains(&index) {
        Acceptance::Unexpected
    } else if remaining.remove(&index) {
        Acceptance::Applied
    } else {
        Acceptance::Duplicate
    }
}

/// Work derived from one assignment list.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// One batch per destination task, ascending by task
    pub outbound: Vec<OutboundBatch>,
    pub local_copies: Vec<LocalCopy>,
    /// Indices already in place after the local copies
    pub local_indices: ActiveParticles,
    pub incoming: IncomingTransfers,
    /// Distinct source indices serialized
    pub serialized: usize,
}

impl MigrationPlan {
    /// Total map entries across all outbound batches.
    pub fn outbound_maps(&self) -> usize {
        self.outbound.iter().map(|b| b.list.maps.len()).sum()
    }
}

/// Validate `assignments` against this task's state and derive the plan.
pub fn plan_migration(
    task_id: u32,
    assignments: &ParticleAssignments,
    active: &ActiveParticles,
    table: &ParticleTable,
) -> Result<MigrationPlan, CoordinatorError> {
    validate(task_id, assignments, active, table)?;

    let mut plan = MigrationPlan::default();
    let mut encoded: HashMap<u32, (Vec<u8>, Vec<PoseMsg>)> = HashMap::new();
    let mut batches: BTreeMap<u32, ParticleMapsList> = BTreeMap::new();

    for a in &assignments.assignments {
        if a.new_task == task_id {
            plan.incoming.expect_value(a.new_index);
            if a.previous_task != task_id {
                plan.incoming.expect_map(a.new_index);
            }
        }
        if a.previous_task != task_id {
            continue;
        }
        let Some(source) = table.get(a.previous_index) else {
            continue;
        };

        if a.new_task == task_id {
            plan.local_copies.push(LocalCopy {
                previous_index: a.previous_index,
                new_index: a.new_index,
                map: source.map.clone(),
                node: source.node.clone(),
            });
            plan.local_indices.insert(a.new_index);
            continue;
        }

        let (serialized_map, nodes) = encoded
            .entry(a.previous_index)
            .or_insert_with(|| {
                let map = source.map.as_deref().map(ParticleMap::to_bytes);
                let nodes = source
                    .node
                    .as_deref()
                    .map(|n| n.to_poses().into_iter().map(PoseMsg::from).collect())
                    .unwrap_or_default();
                (map.unwrap_or_default(), nodes)
            })
            .clone();
        batches
            .entry(a.new_task)
            .or_insert_with(|| ParticleMapsList {
                maps: Vec::new(),
                cycle: assignments.cycle,
                source_task: task_id,
            })
            .maps
            .push(ParticleMaps {
                serialized_map,
                index: a.new_index,
                task: a.new_task,
                nodes,
            });
    }

    plan.serialized = encoded.len();
    plan.outbound = batches
        .into_iter()
        .map(|(task, list)| OutboundBatch { task, list })
        .collect();
    Ok(plan)
}

fn validate(
    task_id: u32,
    assignments: &ParticleAssignments,
    active: &ActiveParticles,
    table: &ParticleTable,
) -> Result<(), CoordinatorError> {
    let mut destinations = HashSet::with_capacity(assignments.assignments.len());
    for a in &assignments.assignments {
        if !destinations.insert((a.new_task, a.new_index)) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "index {} on task {} is assigned more than once",
                a.new_index, a.new_task
            )));
        }
        if a.new_task == task_id && table.get(a.new_index).is_none() {
            return Err(CoordinatorError::InvariantViolation(format!(
                "new index {} is outside the particle table ({} particles)",
                a.new_index,
                table.len()
            )));
        }
        if a.previous_task != task_id {
            continue;
        }
        if !active.contains(&a.previous_index) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "previous index {} is not active on this task",
                a.previous_index
            )));
        }
        if table.get(a.previous_index).is_none_or(|p| p.map.is_none()) {
            return Err(CoordinatorError::InvariantViolation(format!(
                "active particle {} has no map",
                a.previous_index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Pose2D;
    use crate::io::messages::ParticleAssignment;

    fn table_with_maps(total: u32, active: &ActiveParticles) -> ParticleTable {
        let mut table = ParticleTable::new(total);
        for p in table.active_mut(active) {
            let mut map = ParticleMap::centered(2.0, 2.0, 0.5);
            map.mark_hit(p.index as f32 * 0.1, 0.0);
            p.map = Some(Arc::new(map));
            p.push_pose(Pose2D::new(p.index as f32, 0.0, 0.0));
        }
        table
    }

    fn assign(
        previous_task: u32,
        previous_index: u32,
        new_task: u32,
        new_index: u32,
    ) -> ParticleAssignment {
        ParticleAssignment {
            previous_task,
            previous_index,
            new_task,
            new_index,
        }
    }

    fn resampled(list: Vec<ParticleAssignment>) -> ParticleAssignments {
        ParticleAssignments {
            assignments: list,
            resampled: true,
            cycle: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_classifies_entries() {
        let active: ActiveParticles = (0..3).collect();
        let table = table_with_maps(6, &active);
        let assignments = resampled(vec![
            assign(0, 0, 0, 0),
            assign(0, 0, 0, 1),
            assign(0, 2, 1, 3),
            assign(0, 2, 1, 4),
            assign(1, 5, 0, 2),
            assign(1, 4, 1, 5),
        ]);

        let plan = plan_migration(0, &assignments, &active, &table).unwrap();

        assert_eq!(plan.local_copies.len(), 2);
        assert_eq!(plan.local_indices, [0, 1].into_iter().collect());
        assert_eq!(plan.outbound.len(), 1);
        assert_eq!(plan.outbound[0].task, 1);
        assert_eq!(plan.outbound[0].list.cycle, 4);
        assert_eq!(plan.outbound[0].list.source_task, 0);
        assert_eq!(plan.outbound_maps(), 2);
        assert_eq!(plan.serialized, 1);
        assert_eq!(plan.incoming.expecting_maps(), 1);
        assert_eq!(plan.incoming.expecting_values(), 3);
    }

    #[test]
    fn test_fan_out_shares_serialized_bytes() {
        let active: ActiveParticles = (0..2).collect();
        let table = table_with_maps(4, &active);
        let assignments = resampled(vec![assign(0, 1, 1, 2), assign(0, 1, 1, 3)]);

        let plan = plan_migration(0, &assignments, &active, &table).unwrap();
        let maps = &plan.outbound[0].list.maps;
        assert_eq!(maps[0].serialized_map, maps[1].serialized_map);
        assert_eq!(
            maps[0].serialized_map,
            table.get(1).unwrap().map.as_ref().unwrap().to_bytes()
        );
        assert_eq!(maps[0].nodes.len(), 1);
    }

    #[test]
    fn test_inactive_previous_index_rejected() {
        let active: ActiveParticles = (0..3).collect();
        let table = table_with_maps(6, &active);
        let assignments = resampled(vec![assign(0, 4, 1, 4)]);
        let err = plan_migration(0, &assignments, &active, &table).unwrap_err();
        assert!(matches!(err, CoordinatorError::InvariantViolation(_)));
    }

    #[test]
    fn test_duplicate_destination_rejected() {
        let active: ActiveParticles = (0..3).collect();
        let table = table_with_maps(6, &active);
        let assignments = resampled(vec![assign(0, 0, 0, 1), assign(0, 2, 0, 1)]);
        assert!(plan_migration(0, &assignments, &active, &table).is_err());
    }

    #[test]
    fn test_out_of_range_destination_rejected() {
        let active: ActiveParticles = (0..3).collect();
        let table = table_with_maps(6, &active);
        let assignments = resampled(vec![assign(1, 4, 0, 6)]);
        assert!(plan_migration(0, &assignments, &active, &table).is_err());
    }

    #[test]
    fn test_active_particle_without_map_rejected() {
        let active: ActiveParticles = (0..3).collect();
        let table = ParticleTable::new(6);
        let assignments = resampled(vec![assign(0, 1, 0, 1)]);
        assert!(plan_migration(0, &assignments, &active, &table).is_err());
    }

    #[test]
    fn test_acceptance_is_at_most_once() {
        let mut incoming = IncomingTransfers::default();
        incoming.expect_map(5);
        assert_eq!(incoming.accept_map(7), Acceptance::Unexpected);
        assert_eq!(incoming.accept_map(5), Acceptance::Applied);
        assert_eq!(incoming.accept_map(5), Acceptance::Duplicate);
        assert_eq!(incoming.expecting_maps(), 0);
        assert!(incoming.is_complete());
    }
}
