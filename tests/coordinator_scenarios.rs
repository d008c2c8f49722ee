//! End-to-end protocol scenarios driven by hand, one message at a time.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{
    FailingMaps, Recorder, assign, assignments, coordinator, coordinator_with, scan, values,
};
use vibhaga_slam::engine::{
    AssignmentPlanner, CoordinatorError, DispatchError, LowVariancePlanner,
    LowVariancePlannerConfig, MatchState, values_for_assignments,
};
use vibhaga_slam::io::codec::{MessageKind, decode};
use vibhaga_slam::io::messages::{ParticleMapsList, ParticleSummaries};
use vibhaga_slam::io::{Inbound, Route};
use vibhaga_slam::particles::{ActiveParticles, ParticleMap, Partition};

/// Index 2 moves from task 0 to task 1 as index 5.
fn migrate_two_to_five() -> Vec<vibhaga_slam::io::messages::ParticleAssignment> {
    vec![
        assign(0, 0, 0, 0),
        assign(0, 1, 0, 1),
        assign(0, 2, 1, 5),
        assign(1, 3, 1, 3),
        assign(1, 4, 1, 4),
        assign(2, 6, 2, 6),
        assign(2, 7, 2, 7),
        assign(2, 8, 2, 8),
    ]
}

#[test]
fn test_remote_map_arrives_byte_identical() {
    let (mut c0, r0) = coordinator(0, 3, 9);
    let (mut c1, r1) = coordinator(1, 3, 9);
    c0.handle_scan(scan(7)).unwrap();
    c1.handle_scan(scan(7)).unwrap();

    let source = c0.particles().get(2).unwrap();
    let source_map = source.map.as_ref().unwrap().to_bytes();
    let source_trajectory = source.node.as_ref().unwrap().to_poses();

    let plan = assignments(migrate_two_to_five(), true, 5, 1, 7);
    c0.handle_assignments(plan.clone()).unwrap();
    assert_eq!(c0.state(), MatchState::WaitingForNewParticles);
    assert_eq!(c0.expecting_particle_maps(), 0);
    assert_eq!(c0.expecting_particle_values(), 2);

    let batches = r0.payloads(Route::Maps { task: 1 });
    assert_eq!(batches.len(), 1);
    let list: ParticleMapsList = decode(MessageKind::Maps, &batches[0]).unwrap();
    assert_eq!(list.maps.len(), 1);
    assert_eq!(list.maps[0].index, 5);
    assert_eq!(list.maps[0].serialized_map, source_map);

    c0.handle_values(values(0, &[0, 1], 1)).unwrap();
    assert_eq!(c0.state(), MatchState::WaitingForReading);
    assert_eq!(c0.active_particles(), &[0, 1].into_iter().collect::<ActiveParticles>());
    assert!(c0.particles().get(2).unwrap().is_cleared());
    assert_eq!(r0.count(Route::BestParticle), 0);

    c1.handle_assignments(plan).unwrap();
    assert_eq!(c1.expecting_particle_maps(), 1);
    assert_eq!(c1.expecting_particle_values(), 3);
    c1.handle_inbound(Inbound::Maps(batches[0].clone())).unwrap();
    c1.handle_values(values(1, &[3, 4, 5], 1)).unwrap();

    assert_eq!(c1.state(), MatchState::WaitingForReading);
    let migrated = c1.particles().get(5).unwrap();
    assert_eq!(migrated.map.as_ref().unwrap().to_bytes(), source_map);
    assert_eq!(migrated.node.as_ref().unwrap().to_poses(), source_trajectory);
    assert_eq!(c1.matcher().resampled_calls, 1);
    assert_eq!(r1.count(Route::BestParticle), 1);
    assert_eq!(r1.routes().last(), Some(&Route::Ready));
}

#[test]
fn test_not_resampled_finalizes_without_transfers() {
    let (mut c, recorder) = coordinator(0, 3, 9);
    c.handle_scan(scan(3)).unwrap();
    let identity = (0..9).map(|i| assign(i / 3, i, i / 3, i)).collect();

    c.handle_assignments(assignments(identity, false, 1, 1, 3))
        .unwrap();

    assert_eq!(c.state(), MatchState::WaitingForReading);
    assert_eq!(c.matcher().post_calls, 1);
    assert_eq!(c.matcher().resampled_calls, 0);
    assert_eq!(c.active_particles(), &(0..3).collect::<ActiveParticles>());
    assert_eq!(
        recorder.routes(),
        vec![Route::Summaries, Route::BestParticle, Route::Ready]
    );
    assert_eq!(c.stats().cycles_completed, 1);
}

#[test]
fn test_early_map_batch_buffered_and_replayed_once() {
    let (mut c0, r0) = coordinator(0, 3, 9);
    let (mut c1, _r1) = coordinator(1, 3, 9);
    c0.handle_scan(scan(7)).unwrap();
    c1.handle_scan(scan(7)).unwrap();
    let own_map = c1.particles().get(5).unwrap().map.as_ref().unwrap().to_bytes();

    let plan = assignments(migrate_two_to_five(), true, 5, 1, 7);
    c0.handle_assignments(plan.clone()).unwrap();
    let batch = r0.payloads(Route::Maps { task: 1 }).remove(0);

    // Map batch overtakes the assignment broadcast
    c1.handle_inbound(Inbound::Maps(batch)).unwrap();
    assert_eq!(c1.state(), MatchState::WaitingForParticleAssignments);
    assert_eq!(c1.pending_counts(), (1, 0));
    assert_eq!(
        c1.particles().get(5).unwrap().map.as_ref().unwrap().to_bytes(),
        own_map
    );
    assert_eq!(c1.stats().maps_received, 0);

    c1.handle_assignments(plan).unwrap();
    assert_eq!(c1.pending_counts(), (0, 0));
    assert_eq!(c1.expecting_particle_maps(), 0);
    assert_eq!(c1.stats().maps_received, 1);

    c1.handle_values(values(1, &[3, 4, 5], 1)).unwrap();
    assert_eq!(c1.state(), MatchState::WaitingForReading);
    assert_eq!(c1.stats().maps_received, 1);
}

#[test]
fn test_early_values_buffered() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    c.handle_values(values(1, &[3, 4], 1)).unwrap();
    assert_eq!(c.pending_counts(), (0, 1));

    let list = vec![assign(1, 3, 1, 3), assign(1, 4, 1, 4)];
    c.handle_assignments(assignments(list, true, 3, 1, 7)).unwrap();
    assert_eq!(c.state(), MatchState::WaitingForReading);
    assert_eq!(c.stats().values_received, 2);
    assert_eq!(c.active_particles(), &[3, 4].into_iter().collect::<ActiveParticles>());
    assert!(c.particles().get(5).unwrap().is_cleared());
}

#[test]
fn test_duplicate_deliveries_applied_once() {
    let (mut c0, r0) = coordinator(0, 3, 9);
    let (mut c1, _) = coordinator(1, 3, 9);
    c0.handle_scan(scan(7)).unwrap();
    c1.handle_scan(scan(7)).unwrap();
    let plan = assignments(migrate_two_to_five(), true, 5, 1, 7);
    c0.handle_assignments(plan.clone()).unwrap();
    let batch = r0.payloads(Route::Maps { task: 1 }).remove(0);

    c1.handle_assignments(plan).unwrap();
    c1.handle_inbound(Inbound::Maps(batch.clone())).unwrap();
    c1.handle_inbound(Inbound::Maps(batch)).unwrap();
    assert_eq!(c1.expecting_particle_maps(), 0);
    assert_eq!(c1.stats().maps_received, 1);

    c1.handle_values(values(1, &[3], 1)).unwrap();
    c1.handle_values(values(1, &[3], 1)).unwrap();
    assert_eq!(c1.expecting_particle_values(), 2);
    assert_eq!(c1.state(), MatchState::WaitingForNewParticles);

    // Index 7 is not expected here
    c1.handle_values(values(1, &[7], 1)).unwrap();
    assert_eq!(c1.expecting_particle_values(), 2);

    c1.handle_values(values(1, &[4, 5], 1)).unwrap();
    assert_eq!(c1.state(), MatchState::WaitingForReading);
    assert_eq!(c1.stats().values_received, 3);
}

#[test]
fn test_batches_from_other_cycle_dropped() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    let list = vec![assign(1, 3, 1, 3), assign(1, 4, 1, 4)];
    c.handle_assignments(assignments(list, true, 3, 4, 7)).unwrap();

    c.handle_values(values(1, &[3, 4], 3)).unwrap();
    assert_eq!(c.expecting_particle_values(), 2);
    assert_eq!(c.stats().messages_dropped, 1);

    c.handle_values(values(1, &[3, 4], 4)).unwrap();
    assert_eq!(c.state(), MatchState::WaitingForReading);
}

#[test]
fn test_batches_for_finished_cycle_not_buffered() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    let list = vec![assign(1, 3, 1, 3), assign(1, 4, 1, 4)];
    c.handle_assignments(assignments(list, false, 3, 4, 7)).unwrap();
    assert_eq!(c.state(), MatchState::WaitingForReading);

    c.handle_scan(scan(8)).unwrap();
    c.handle_values(values(1, &[3, 4], 4)).unwrap();
    c.handle_maps(ParticleMapsList {
        cycle: 2,
        source_task: 0,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(c.pending_counts(), (0, 0));
    assert_eq!(c.stats().messages_dropped, 2);

    c.handle_values(values(1, &[3, 4], 5)).unwrap();
    assert_eq!(c.pending_counts(), (0, 1));
}

#[test]
fn test_early_batches_beyond_buffer_limit_dropped() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    for _ in 0..40 {
        c.handle_values(values(1, &[3], 1)).unwrap();
    }
    let (_, buffered) = c.pending_counts();
    assert!(buffered < 40);
    assert_eq!(c.stats().messages_dropped, (40 - buffered) as u64);

    let list = vec![assign(1, 3, 1, 3), assign(1, 4, 1, 4)];
    c.handle_assignments(assignments(list, true, 3, 1, 7)).unwrap();
    assert_eq!(c.pending_counts(), (0, 0));
    assert_eq!(c.expecting_particle_values(), 1);

    c.handle_values(values(1, &[4], 1)).unwrap();
    assert_eq!(c.state(), MatchState::WaitingForReading);
}

#[test]
fn test_stale_assignments_rejected() {
    let (mut c, recorder) = coordinator(0, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    let err = c
        .handle_assignments(assignments(vec![assign(0, 0, 0, 0)], true, 0, 1, 6))
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Stale {
            timestamp_us: 6,
            current_us: 7,
            ..
        }
    ));
    assert!(err.is_transient());
    assert_eq!(c.state(), MatchState::WaitingForParticleAssignments);
    assert_eq!(recorder.routes(), vec![Route::Summaries]);
}

#[test]
fn test_inactive_source_aborts_cycle() {
    let (mut c, recorder) = coordinator(0, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    c.handle_values(values(0, &[0], 1)).unwrap();

    let list = vec![assign(0, 0, 0, 0), assign(0, 5, 1, 5)];
    let err = c
        .handle_assignments(assignments(list, true, 0, 1, 7))
        .unwrap_err();

    assert!(matches!(err, CoordinatorError::InvariantViolation(_)));
    assert!(!err.is_transient());
    assert_eq!(c.state(), MatchState::WaitingForReading);
    assert_eq!(c.pending_counts(), (0, 0));
    assert_eq!(c.stats().cycles_aborted, 1);
    assert_eq!(c.active_particles(), &(0..3).collect::<ActiveParticles>());
    assert_eq!(recorder.count(Route::Maps { task: 1 }), 0);
    assert_eq!(recorder.routes().last(), Some(&Route::Ready));

    // The next scan starts cleanly
    c.handle_scan(scan(8)).unwrap();
    assert_eq!(c.state(), MatchState::WaitingForParticleAssignments);
}

#[test]
fn test_duplicate_destination_aborts_cycle() {
    let (mut c, _) = coordinator(0, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    let list = vec![assign(0, 0, 1, 4), assign(0, 1, 1, 4)];
    let err = c
        .handle_assignments(assignments(list, true, 0, 1, 7))
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvariantViolation(_)));
    assert_eq!(c.state(), MatchState::WaitingForReading);
}

#[test]
fn test_dispatch_failure_aborts_before_local_copies() {
    let transport = Arc::new(FailingMaps {
        inner: Recorder::default(),
        failing_task: 1,
    });
    let mut c = coordinator_with(0, 3, 9, transport.clone());
    c.handle_scan(scan(7)).unwrap();
    let before = c.particles().get(0).unwrap().map.as_ref().unwrap().to_bytes();

    // Index 1 takes over index 0 locally; index 2 goes to task 1
    let list = vec![assign(0, 1, 0, 0), assign(0, 2, 1, 5)];
    let err = c
        .handle_assignments(assignments(list, true, 0, 1, 7))
        .unwrap_err();

    assert!(matches!(
        err,
        CoordinatorError::Dispatch(DispatchError::Send { task: 1, .. })
    ));
    assert_eq!(c.state(), MatchState::WaitingForReading);
    assert_eq!(c.stats().cycles_aborted, 1);
    assert_eq!(
        c.particles().get(0).unwrap().map.as_ref().unwrap().to_bytes(),
        before
    );
    assert_eq!(transport.inner.routes().last(), Some(&Route::Ready));
}

#[test]
fn test_maps_in_waiting_for_reading_rejected() {
    let (mut c, _) = coordinator(0, 3, 9);
    let err = c.handle_maps(ParticleMapsList::default()).unwrap_err();
    assert_eq!(
        err,
        CoordinatorError::UnexpectedMessage {
            kind: MessageKind::Maps,
            state: MatchState::WaitingForReading
        }
    );
    assert_eq!(c.stats().messages_dropped, 1);
}

#[test]
fn test_corrupt_map_in_batch_leaves_counters() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    c.handle_assignments(assignments(migrate_two_to_five(), true, 5, 1, 7))
        .unwrap();

    let corrupt = ParticleMapsList {
        maps: vec![vibhaga_slam::io::messages::ParticleMaps {
            serialized_map: vec![0x0a, 0xff, 0xff],
            index: 5,
            task: 1,
            nodes: Vec::new(),
        }],
        cycle: 1,
        source_task: 0,
    };
    let err = c.handle_maps(corrupt).unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Decode(ref e) if e.kind == MessageKind::ParticleMap
    ));
    assert_eq!(c.expecting_particle_maps(), 1);
    assert_eq!(c.state(), MatchState::WaitingForNewParticles);
}

#[test]
fn test_oversized_map_in_batch_is_transient() {
    let (mut c, _) = coordinator(1, 3, 9);
    c.handle_scan(scan(7)).unwrap();
    c.handle_assignments(assignments(migrate_two_to_five(), true, 5, 1, 7))
        .unwrap();

    let huge = ParticleMap {
        width: 100_000,
        height: 100_000,
        resolution: 1.0,
        ..Default::default()
    };
    let oversized = ParticleMapsList {
        maps: vec![vibhaga_slam::io::messages::ParticleMaps {
            serialized_map: huge.to_bytes(),
            index: 5,
            task: 1,
            nodes: Vec::new(),
        }],
        cycle: 1,
        source_task: 0,
    };
    let err = c.handle_maps(oversized).unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        CoordinatorError::Decode(ref e) if e.kind == MessageKind::ParticleMap
    ));
    assert_eq!(c.expecting_particle_maps(), 1);
    assert_eq!(c.state(), MatchState::WaitingForNewParticles);
}

/// Drive every task through full cycles with the reference planner, routing
/// payloads by hand, and check that the active sets always partition the
/// population exactly as assigned.
#[test]
fn test_active_sets_follow_assignments_over_cycles() {
    let (total, tasks) = (10, 3);
    let mut coordinators: Vec<_> = (0..tasks).map(|t| coordinator(t, tasks, total)).collect();
    let mut planner = LowVariancePlanner::new(
        Partition::new(total, tasks).unwrap(),
        LowVariancePlannerConfig {
            resampling_threshold: 1.0,
            seed: 5,
        },
    );

    for cycle in 1..=4u64 {
        let timestamp_us = cycle * 100;
        for (c, recorder) in &mut coordinators {
            recorder.clear();
            c.handle_scan(scan(timestamp_us)).unwrap();
        }
        let summaries: Vec<ParticleSummaries> = coordinators
            .iter()
            .map(|(_, r)| decode(MessageKind::Summaries, &r.payloads(Route::Summaries)[0]).unwrap())
            .collect();
        let plan = planner.plan(&summaries);
        assert!(plan.resampled);
        assert_eq!(plan.timestamp_us, timestamp_us);
        let value_batches = values_for_assignments(&summaries, &plan);

        // Values overtake the assignments and are buffered everywhere
        for (task, batch) in value_batches {
            coordinators[task as usize].0.handle_values(batch).unwrap();
        }
        for source in 0..tasks as usize {
            coordinators[source].0.handle_assignments(plan.clone()).unwrap();
            for dest in 0..tasks {
                for payload in coordinators[source].1.payloads(Route::Maps { task: dest }) {
                    coordinators[dest as usize]
                        .0
                        .handle_inbound(Inbound::Maps(payload))
                        .unwrap();
                }
            }
        }

        let mut union = BTreeSet::new();
        for (t, (c, _)) in coordinators.iter().enumerate() {
            assert_eq!(c.state(), MatchState::WaitingForReading, "task {t}");
            let expected: ActiveParticles = plan
                .assignments
                .iter()
                .filter(|a| a.new_task == t as u32)
                .map(|a| a.new_index)
                .collect();
            assert_eq!(c.active_particles(), &expected, "task {t}");
            for p in c.particles().iter() {
                assert_eq!(p.is_cleared(), !expected.contains(&p.index));
            }
            for &i in &expected {
                assert!(union.insert(i), "index {i} active on two tasks");
            }
        }
        assert_eq!(union, (0..total).collect::<BTreeSet<u32>>());
    }
}
