// tests/tracker_concurrency.rs

mod common;
use crate::common::{init_tracing, tracker_for, RecordingScheduler, TaskBuilder};

use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;

use tierflow::tier::{ExecutionStatus, RunPhase};

const WIDTH: usize = 16;

fn wide_task_queue(width: usize) -> tierflow::tier::TierQueue {
    let mut builder = TaskBuilder::new("T1");
    for i in 0..width {
        builder = builder.step(1, &format!("w{i}"));
    }
    builder.step(2, "after").plan()
}

#[test]
fn test_simultaneous_completions_release_next_tier_once() {
    init_tracing();

    for _ in 0..20 {
        let sched = RecordingScheduler::new();
        let tracker = tracker_for(wide_task_queue(WIDTH), &sched);
        tracker.start().unwrap();

        let barrier = Arc::new(Barrier::new(WIDTH));
        let handles: Vec<_> = (0..WIDTH)
            .map(|i| {
                let sched = sched.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sched.complete("T1", &format!("w{i}"), true);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let after = sched.submitted().iter().filter(|n| *n == "after").count();
        assert_eq!(after, 1);
        assert_eq!(tracker.running(), vec!["after"]);
        assert_eq!(tracker.phase(), RunPhase::Running { tier: 2 });
        for i in 0..WIDTH {
            assert_eq!(
                tracker.status_of(&format!("w{i}")),
                Some(ExecutionStatus::Completed)
            );
        }
    }
}

#[test]
fn test_simultaneous_completions_with_one_failure_halt() {
    for _ in 0..20 {
        let sched = RecordingScheduler::new();
        let tracker = tracker_for(wide_task_queue(WIDTH), &sched);
        tracker.start().unwrap();

        let barrier = Arc::new(Barrier::new(WIDTH));
        let handles: Vec<_> = (0..WIDTH)
            .map(|i| {
                let sched = sched.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    sched.complete("T1", &format!("w{i}"), i != 7);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(!sched.submitted().iter().any(|n| n == "after"));
        assert_eq!(
            tracker.phase(),
            RunPhase::Halted {
                tier: 1,
                failed: vec!["w7".to_string()]
            }
        );
        assert_eq!(tracker.status_of("after"), Some(ExecutionStatus::New));
    }
}

#[test]
fn test_duplicate_deliveries_from_many_threads() {
    let sched = RecordingScheduler::new();
    let tracker = tracker_for(wide_task_queue(4), &sched);
    tracker.start().unwrap();

    // Every step is reported three times, from different threads.
    let barrier = Arc::new(Barrier::new(12));
    let handles: Vec<_> = (0..12)
        .map(|i| {
            let sched = sched.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                sched.complete("T1", &format!("w{}", i % 4), true);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(sched.submitted().iter().filter(|n| *n == "after").count(), 1);
    assert_eq!(tracker.running(), vec!["after"]);
}

proptest! {
    /// Any interleaving of completions (with repeats) leaves exactly one
    /// terminal state per released step and a running set that only
    /// shrinks within a tier.
    #[test]
    fn test_any_completion_order_is_consistent(
        tiers in proptest::collection::vec(1u32..4, 1..10),
        script in proptest::collection::vec((0usize..10, any::<bool>()), 0..60),
    ) {
        let mut builder = TaskBuilder::new("T1");
        for (i, tier) in tiers.iter().enumerate() {
            builder = builder.step(*tier, &format!("s{i}"));
        }
        let sched = RecordingScheduler::new();
        let tracker = tracker_for(builder.plan(), &sched);
        tracker.start().unwrap();

        let mut first_outcome: std::collections::HashMap<String, bool> = Default::default();
        let mut last_running = tracker.running().len();
        let mut last_tier = match tracker.phase() {
            RunPhase::Running { tier } => tier,
            other => panic!("unexpected phase {other:?}"),
        };

        for (idx, success) in script {
            let name = format!("s{}", idx % tiers.len());
            let was_processing = tracker.status_of(&name) == Some(ExecutionStatus::Processing);
            sched.complete("T1", &name, success);
            if was_processing {
                first_outcome.entry(name.clone()).or_insert(success);
            }

            let running = tracker.running().len();
            match tracker.phase() {
                RunPhase::Running { tier } if tier == last_tier => {
                    prop_assert!(running <= last_running);
                }
                RunPhase::Running { tier } => {
                    prop_assert!(tier > last_tier);
                    last_tier = tier;
                }
                _ => prop_assert_eq!(running, 0),
            }
            last_running = running;
        }

        // Each step's status reflects its first accepted report only.
        for (name, success) in &first_outcome {
            let expected = if *success { ExecutionStatus::Completed } else { ExecutionStatus::Failed };
            prop_assert_eq!(tracker.status_of(name), Some(expected));
        }

        // Steps never released stay New; released ones are never New.
        for name in sched.submitted() {
            prop_assert_ne!(tracker.status_of(&name), Some(ExecutionStatus::New));
        }
        let submitted = sched.submitted();
        prop_assert_eq!(
            submitted.len(),
            submitted.iter().collect::<std::collections::HashSet<_>>().len()
        );
        for (name, status) in tracker.statuses() {
            if !submitted.contains(&name) {
                prop_assert_eq!(status, ExecutionStatus::New);
            }
        }

        if tracker.phase() == RunPhase::Completed {
            prop_assert!(tracker.statuses().values().all(|s| *s == ExecutionStatus::Completed));
        }
    }
}
