// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/mining_loop.rs
// Version: 1.1.0
//
// Lane worker threads and the supervisory mining loop. Each lane worker owns
// its device backend exclusively; the supervisor only touches the shared
// control blocks and the wake channels, so a park/resume race can never put
// two dispatches in flight on one device.
//
// Tree Location:
// - src/miner/mining_loop.rs (workers + supervisory loop)
// - Depends on: crossbeam, anyhow, tracing

use anyhow::Result;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::miner::completion::{finish_dispatch, LaneOutcome};
use crate::miner::lane::{LaneBackend, LaneControl};
use crate::miner::stats::sample_rates;
use crate::pool::JobSource;
use crate::utils::format::FormatUtils;

/// Supervisory tick: connection check, rate report, resume sweep.
const DEFAULT_TICK: Duration = Duration::from_secs(15);
/// Poll interval while waiting for the first work item.
const WORK_POLL: Duration = Duration::from_millis(200);

/// Supervisor-side handle to one running lane worker.
#[derive(Debug)]
pub struct LaneHandle {
    pub index: usize,
    pub name: String,
    pub intensity: i32,
    pub control: Arc<LaneControl>,
    wake: Sender<()>,
    thread: JoinHandle<()>,
}

impl LaneHandle {
    pub fn control(&self) -> Arc<LaneControl> {
        Arc::clone(&self.control)
    }
}

/// Spawn one lane worker. The backend is constructed by `init` on the worker
/// thread itself, and construction failure is reported back before this
/// function returns: a lane whose pipeline fails to build never yields a
/// handle and never receives work.
pub fn spawn_lane<B, F>(
    index: usize,
    name: String,
    intensity: i32,
    source: Arc<dyn JobSource>,
    init: F,
) -> Result<LaneHandle>
where
    B: LaneBackend + 'static,
    F: FnOnce() -> Result<B> + Send + 'static,
{
    let control = Arc::new(LaneControl::new());
    let worker_control = Arc::clone(&control);
    let (wake_tx, wake_rx) = unbounded::<()>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

    let worker_name = name.clone();
    let thread = thread::Builder::new()
        .name(format!("lane-{}", index))
        .spawn(move || {
            let mut backend = match init() {
                Ok(backend) => {
                    let _ = ready_tx.send(Ok(()));
                    backend
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            lane_worker(
                &worker_control,
                &wake_rx,
                &source,
                &mut backend,
                intensity,
                &worker_name,
            );
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(LaneHandle {
            index,
            name,
            intensity,
            control,
            wake: wake_tx,
            thread,
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(anyhow::anyhow!("Lane {} worker exited during setup", index))
        }
    }
}

/// Worker body: sleep on the wake channel, then run dispatches back-to-back
/// until the job source runs dry and the lane parks itself. The supervisor
/// sends at most one wake per park, always after winning the resume CAS.
fn lane_worker(
    control: &LaneControl,
    wake: &Receiver<()>,
    source: &Arc<dyn JobSource>,
    backend: &mut dyn LaneBackend,
    intensity: i32,
    name: &str,
) {
    while wake.recv().is_ok() {
        loop {
            let work = match source.get_work() {
                Some(work) => work,
                None => {
                    debug!("Lane {}: no work available, parking", name);
                    control.park();
                    break;
                }
            };
            if let Err(e) = backend.dispatch(&work) {
                error!("Lane {}: dispatch failed, shutting lane down: {}", name, e);
                control.fail();
                return;
            }
            match backend.wait_results() {
                Ok(solutions) => {
                    if finish_dispatch(control, source, &work, solutions, intensity)
                        == LaneOutcome::Parked
                    {
                        break;
                    }
                }
                Err(e) => {
                    error!("Lane {}: completion failed, shutting lane down: {}", name, e);
                    control.fail();
                    return;
                }
            }
        }
    }
}

/// The supervisory loop: waits for the first work item, wakes the lanes, and
/// then ticks until the connection is lost, reporting rates and resuming
/// parked lanes along the way.
pub struct MiningLoop {
    lanes: Vec<LaneHandle>,
    source: Arc<dyn JobSource>,
    tick: Duration,
}

impl MiningLoop {
    pub fn new(lanes: Vec<LaneHandle>, source: Arc<dyn JobSource>) -> Self {
        Self {
            lanes,
            source,
            tick: DEFAULT_TICK,
        }
    }

    /// Shorter supervisory tick; used by tests.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run until the job source loses its connection, then drain the lane
    /// workers and return.
    pub fn run(self) {
        self.source.start_working();

        while self.source.has_connection() && !self.source.has_work() {
            thread::sleep(WORK_POLL);
        }

        if self.source.has_connection() {
            info!("⛏️  Work received, starting {} mining lane(s)", self.lanes.len());
            for lane in &self.lanes {
                if lane.control.begin() {
                    let _ = lane.wake.send(());
                }
            }
        }

        loop {
            thread::sleep(self.tick);

            if !self.source.has_connection() {
                info!("Connection lost, stopping mining lanes");
                break;
            }

            // Rate reporting pauses during a reconnect. The resume sweep
            // below does not: a parked lane with work available is woken
            // even mid-reconnect.
            if !self.source.is_connecting() {
                let interval = self.tick.as_secs_f64();
                let report = sample_rates(self.lanes.iter().map(|l| l.control.as_ref()), interval);
                for (lane, rate) in self.lanes.iter().zip(&report.per_lane) {
                    if lane.control.is_failed() {
                        warn!("⚠️ Lane {} ({}): failed, excluded", lane.index, lane.name);
                    } else {
                        info!(
                            "📊 Lane {} ({}): {}",
                            lane.index,
                            lane.name,
                            FormatUtils::format_rate(*rate)
                        );
                    }
                }
                info!("📊 Total: {}", FormatUtils::format_rate(report.total));
            }

            if self.source.has_work() {
                for lane in &self.lanes {
                    if lane.control.resume() {
                        let _ = lane.wake.send(());
                    }
                }
            }
        }

        for lane in self.lanes {
            let LaneHandle { wake, thread, .. } = lane;
            drop(wake);
            let _ = thread.join();
        }
    }
}
