// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/lane.rs
// Version: 1.1.0
//
// Per-device lane state. A lane is the unit of mining concurrency: one
// device, one pipeline, one worker thread that owns it exclusively. The
// shared `LaneControl` is the only cross-thread surface.
//
// Tree Location:
// - src/miner/lane.rs (lane state machine and backend seam)
// - Depends on: opencl3, anyhow

use anyhow::Result;
use opencl3::event::Event;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::core::{Solution, WorkItem};
use crate::miner::pipeline::{DevicePipeline, Tier, RESULT_WORDS};

/// Lifecycle of a lane. `Paused` means parked for lack of work; only the
/// supervisor resumes a paused lane, and only the worker parks it. `Failed`
/// is terminal: a lane whose device errored never resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Failed = 3,
}

impl LaneState {
    fn from_u8(v: u8) -> LaneState {
        match v {
            1 => LaneState::Running,
            2 => LaneState::Paused,
            3 => LaneState::Failed,
            _ => LaneState::Idle,
        }
    }
}

/// Shared control block between a lane's worker thread and the supervisor.
///
/// State transitions go through compare-and-swap so a park/resume race can
/// never produce two concurrent dispatches on one lane: whichever side loses
/// the CAS simply does nothing.
#[derive(Debug)]
pub struct LaneControl {
    state: AtomicU8,
    solutions: AtomicU64,
}

impl LaneControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LaneState::Idle as u8),
            solutions: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LaneState {
        LaneState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_paused(&self) -> bool {
        self.state() == LaneState::Paused
    }

    /// Idle → Running; the worker's first transition after a wake.
    pub fn begin(&self) -> bool {
        self.state
            .compare_exchange(
                LaneState::Idle as u8,
                LaneState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Paused → Running; the supervisor's resume. Returns false if the lane
    /// was not parked (already resumed, or still running).
    pub fn resume(&self) -> bool {
        self.state
            .compare_exchange(
                LaneState::Paused as u8,
                LaneState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Running → Paused; only ever called by the owning worker.
    pub fn park(&self) {
        self.state.store(LaneState::Paused as u8, Ordering::Release);
    }

    /// Terminal transition after a device error; only ever called by the
    /// owning worker. A failed lane is never Paused, so `resume` can never
    /// revive it.
    pub fn fail(&self) {
        self.state.store(LaneState::Failed as u8, Ordering::Release);
    }

    pub fn is_failed(&self) -> bool {
        self.state() == LaneState::Failed
    }

    pub fn record_solutions(&self, count: u64) {
        self.solutions.fetch_add(count, Ordering::Relaxed);
    }

    /// Read-and-reset the rolling solution counter (rate sampling).
    pub fn take_solutions(&self) -> u64 {
        self.solutions.swap(0, Ordering::Relaxed)
    }
}

impl Default for LaneControl {
    fn default() -> Self {
        Self::new()
    }
}

/// What a lane worker needs from its device: start one dispatch without
/// blocking, then wait out the in-flight dispatch and surface its candidates.
/// The seam exists so the worker/supervisor machinery is testable without an
/// OpenCL runtime.
pub trait LaneBackend {
    /// Enqueue one full search over `work`. Must not wait for the device.
    fn dispatch(&mut self, work: &WorkItem) -> Result<()>;

    /// Block until the in-flight dispatch completes, then harvest candidates.
    fn wait_results(&mut self) -> Result<Vec<Solution>>;
}

/// One device lane: the pipeline plus the host-side completion state.
pub struct DeviceLane {
    pub(crate) pipeline: DevicePipeline,
    /// Host destination of the non-blocking result read. Untouched by the
    /// host between dispatch and event completion.
    pub(crate) host_results: Vec<u32>,
    pub(crate) pending: Option<Event>,
    pub(crate) ordinal: u32,
    pub(crate) name: String,
}

impl DeviceLane {
    pub fn new(pipeline: DevicePipeline, ordinal: u32, name: String) -> Self {
        Self {
            pipeline,
            host_results: vec![0u32; RESULT_WORDS],
            pending: None,
            ordinal,
            name,
        }
    }

    pub fn tier(&self) -> Tier {
        self.pipeline.tier
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_requires_idle() {
        let control = LaneControl::new();
        assert!(control.begin());
        assert!(!control.begin());
        assert_eq!(control.state(), LaneState::Running);
    }

    #[test]
    fn test_resume_only_from_paused() {
        let control = LaneControl::new();
        assert!(!control.resume());
        control.begin();
        control.park();
        assert!(control.is_paused());
        assert!(control.resume());
        assert!(!control.resume());
        assert_eq!(control.state(), LaneState::Running);
    }

    #[test]
    fn test_failed_lane_cannot_resume() {
        let control = LaneControl::new();
        control.begin();
        control.fail();
        assert!(control.is_failed());
        assert!(!control.is_paused());
        assert!(!control.resume());
        assert!(!control.begin());
        assert_eq!(control.state(), LaneState::Failed);
    }

    #[test]
    fn test_solution_counter_read_reset() {
        let control = LaneControl::new();
        control.record_solutions(3);
        control.record_solutions(2);
        assert_eq!(control.take_solutions(), 5);
        assert_eq!(control.take_solutions(), 0);
    }
}
