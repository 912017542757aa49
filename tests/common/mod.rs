#![allow(dead_code)]

use std::sync::Arc;

use tierflow::scheduler::SchedulerAdapter;
use tierflow::tier::{ExecutionTracker, TierQueue};

pub use tierflow_test_utils::builders::{ConfigFileBuilder, StepBuilder, TaskBuilder};
pub use tierflow_test_utils::fake_scheduler::RecordingScheduler;
pub use tierflow_test_utils::{init_tracing, with_timeout};

/// The three-step task used throughout: A and B in tier 1, C in tier 2.
pub fn abc_queue() -> TierQueue {
    TaskBuilder::new("T1")
        .step(1, "A")
        .step(1, "B")
        .step(2, "C")
        .plan()
}

/// A tracker for `queue` under task `T1`, wired to `scheduler`.
pub fn tracker_for(queue: TierQueue, scheduler: &RecordingScheduler) -> Arc<ExecutionTracker> {
    let adapter: Arc<dyn SchedulerAdapter> = Arc::new(scheduler.clone());
    ExecutionTracker::new("T1", 1, queue, adapter)
}
