// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/completion.rs
// Version: 1.1.0
//
// Completion handling for one finished dispatch: harvest candidates from the
// result region, forward them, throttle, and decide whether the lane keeps
// running or parks.
//
// Tree Location:
// - src/miner/completion.rs (harvest, throttle, continuation policy)
// - Depends on: tracing

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::core::{Solution, WorkItem, INTENSITY_MAX, SOLUTION_WORDS};
use crate::miner::lane::LaneControl;
use crate::miner::pipeline::MAX_SOLUTIONS;
use crate::pool::JobSource;

/// What the lane worker does after a completed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneOutcome {
    /// Work is available; dispatch again.
    Continue,
    /// No work; the lane has been parked and waits for a resume.
    Parked,
}

/// Extract candidate solutions from a raw result region. Word 0 holds the
/// candidate count; candidate `i` occupies the 32 words starting at
/// `4 + 32*i`. The kernel may report more finds than the region can hold, so
/// the count is clamped to capacity.
pub fn harvest(words: &[u32]) -> Vec<Solution> {
    let count = (words[0] as usize).min(MAX_SOLUTIONS);
    let mut solutions = Vec::with_capacity(count);
    for i in 0..count {
        let start = 4 + SOLUTION_WORDS * i;
        let mut solution: Solution = [0u32; SOLUTION_WORDS];
        solution.copy_from_slice(&words[start..start + SOLUTION_WORDS]);
        solutions.push(solution);
    }
    solutions
}

/// Pause between dispatches for a lane's intensity. Maximum intensity (999)
/// still yields 1 ms so the device driver gets scheduling air.
pub fn throttle_delay(intensity: i32) -> Duration {
    let ms = (1000 - intensity.clamp(0, INTENSITY_MAX)) as u64;
    Duration::from_millis(ms)
}

/// Finish one dispatch: hand every candidate to the job source against the
/// work item it was searched under, bump the lane's rolling counter, apply
/// the throttle, then continue or park depending on work availability.
pub fn finish_dispatch(
    control: &LaneControl,
    source: &Arc<dyn JobSource>,
    work: &WorkItem,
    solutions: Vec<Solution>,
    intensity: i32,
) -> LaneOutcome {
    let count = solutions.len() as u64;
    for solution in &solutions {
        source.handle_solution(work, solution);
    }
    if count > 0 {
        control.record_solutions(count);
    }

    thread::sleep(throttle_delay(intensity));

    if source.has_work() {
        LaneOutcome::Continue
    } else {
        debug!("No work available, pausing lane");
        control.park();
        LaneOutcome::Parked
    }
}
