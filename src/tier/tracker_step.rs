// src/tier/tracker_step.rs

//! Result type for a single tracker state transition.

use crate::tier::descriptor::JobUnit;

/// What changed as the result of one tracker transition.
///
/// Tests can drive [`crate::tier::TrackerState`] directly and assert on
/// these without a scheduler.
#[derive(Debug, Clone, Default)]
pub struct TrackerStep {
    /// Units of the tier that was just released, in submission order. The
    /// caller must submit exactly these.
    pub released: Vec<JobUnit>,
    /// Steps newly marked `Failed` by this transition.
    pub newly_failed: Vec<String>,
    /// Whether this transition moved the run into a terminal phase.
    pub run_just_finished: bool,
}
