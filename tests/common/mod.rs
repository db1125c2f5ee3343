// Beamline Miner - Free and Open Source Software Statement
//
// File: tests/common/mod.rs
// Version: 1.1.0
//
// Shared test doubles: an in-memory job source and a device-free lane
// backend for exercising the worker/supervisor machinery.

use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use beamline::core::{Solution, WorkItem, HEADER_BYTES};
use beamline::miner::LaneBackend;
use beamline::pool::JobSource;

/// Job source backed by a counter of remaining work items.
pub struct MockJobSource {
    connected: AtomicBool,
    connecting: AtomicBool,
    remaining_work: AtomicI64,
    next_nonce: AtomicU64,
    pub handled: Mutex<Vec<(u64, Solution)>>,
}

impl MockJobSource {
    pub fn new(connected: bool, work_items: i64) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            connecting: AtomicBool::new(false),
            remaining_work: AtomicI64::new(work_items),
            next_nonce: AtomicU64::new(0),
            handled: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_connecting(&self, connecting: bool) {
        self.connecting.store(connecting, Ordering::SeqCst);
    }

    pub fn refill_work(&self, work_items: i64) {
        self.remaining_work.store(work_items, Ordering::SeqCst);
    }

    pub fn handled_count(&self) -> usize {
        self.handled.lock().unwrap().len()
    }
}

impl JobSource for MockJobSource {
    fn start_working(&self) {}

    fn has_connection(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    fn has_work(&self) -> bool {
        self.remaining_work.load(Ordering::SeqCst) > 0
    }

    fn get_work(&self) -> Option<WorkItem> {
        if self.remaining_work.fetch_sub(1, Ordering::SeqCst) > 0 {
            Some(WorkItem {
                job_id: 7,
                header: [0xab; HEADER_BYTES],
                nonce: self.next_nonce.fetch_add(1, Ordering::SeqCst),
            })
        } else {
            None
        }
    }

    fn handle_solution(&self, work: &WorkItem, solution: &Solution) {
        self.handled.lock().unwrap().push((work.job_id, *solution));
    }
}

/// Device-free backend. Panics if a second dispatch starts before the first
/// one was waited out.
pub struct MockBackend {
    busy: Arc<AtomicBool>,
    dispatches: Arc<AtomicU64>,
    canned: VecDeque<Vec<Solution>>,
}

impl MockBackend {
    pub fn new(dispatches: Arc<AtomicU64>, canned: Vec<Vec<Solution>>) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            dispatches,
            canned: canned.into(),
        }
    }
}

impl LaneBackend for MockBackend {
    fn dispatch(&mut self, _work: &WorkItem) -> Result<()> {
        assert!(
            !self.busy.swap(true, Ordering::SeqCst),
            "dispatch while a dispatch was already in flight"
        );
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_results(&mut self) -> Result<Vec<Solution>> {
        assert!(
            self.busy.swap(false, Ordering::SeqCst),
            "wait_results without a dispatch in flight"
        );
        Ok(self.canned.pop_front().unwrap_or_default())
    }
}

/// Backend whose device is gone: every dispatch errors.
pub struct FailingBackend {
    dispatches: Arc<AtomicU64>,
}

impl FailingBackend {
    pub fn new(dispatches: Arc<AtomicU64>) -> Self {
        Self { dispatches }
    }
}

impl LaneBackend for FailingBackend {
    fn dispatch(&mut self, _work: &WorkItem) -> Result<()> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        Err(anyhow::anyhow!("device lost"))
    }

    fn wait_results(&mut self) -> Result<Vec<Solution>> {
        Err(anyhow::anyhow!("device lost"))
    }
}
