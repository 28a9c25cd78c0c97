//! Integration tests for concurrent mutations of one owner's graph.

mod common;

use common::{OWNER, TestEnv};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use taskgraph::{MemoryStore, NewTask, Status, TaskError, TaskService};

#[test]
fn test_opposite_edges_race_exactly_one_wins() {
    for _ in 0..50 {
        let env = TestEnv::new();
        let a = env.create_task("A");
        let b = env.create_task("B");
        let barrier = Barrier::new(2);

        let (ab, ba) = thread::scope(|s| {
            let ab = s.spawn(|| {
                barrier.wait();
                env.service.add_dependency(OWNER, &a.id, &b.id)
            });
            let ba = s.spawn(|| {
                barrier.wait();
                env.service.add_dependency(OWNER, &b.id, &a.id)
            });
            (ab.join().unwrap(), ba.join().unwrap())
        });

        assert!(ab.is_ok() != ba.is_ok(), "exactly one edge must win");
        let loser = if ab.is_ok() { ba } else { ab };
        assert!(matches!(loser, Err(TaskError::CycleDetected { .. })));

        let edges = env.deps_of(&a).len() + env.deps_of(&b).len();
        assert_eq!(edges, 1);
    }
}

#[test]
fn test_concurrent_ring_never_closes() {
    let env = TestEnv::new();
    let tasks: Vec<_> = (0..8).map(|i| env.create_task(&format!("T{}", i))).collect();
    let barrier = Barrier::new(tasks.len());

    // Each thread adds T[i] -> T[i+1 mod n]; all of them together form a ring
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..tasks.len())
            .map(|i| {
                let from = &tasks[i];
                let to = &tasks[(i + 1) % tasks.len()];
                let barrier = &barrier;
                let env = &env;
                s.spawn(move || {
                    barrier.wait();
                    env.service.add_dependency(OWNER, &from.id, &to.id)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let failures = results.iter().filter(|r| r.is_err()).count();
    assert_eq!(failures, 1);
}

#[test]
fn test_different_owners_do_not_contend() {
    let service = TaskService::with_lock_timeout(MemoryStore::new(), Duration::from_secs(5));

    thread::scope(|s| {
        for owner in ["alice", "bob", "carol", "dave"] {
            let service = &service;
            s.spawn(move || {
                let mut prev = service.create_task(owner, NewTask::new("root")).unwrap();
                for i in 0..20 {
                    let next = service.create_task(owner, NewTask::new(format!("step {}", i))).unwrap();
                    service.add_dependency(owner, &next.id, &prev.id).unwrap();
                    prev = next;
                }
            });
        }
    });

    for owner in ["alice", "bob", "carol", "dave"] {
        let tasks = service.list_tasks(owner).unwrap();
        assert_eq!(tasks.len(), 21);
        assert_eq!(tasks.iter().filter(|t| t.status == Status::Blocked).count(), 20);
    }
}
