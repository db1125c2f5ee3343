// Beamline Miner - Free and Open Source Software Statement
//
// File: tests/loop_test.rs
// Version: 1.1.0
//
// Supervisory loop behaviour against mock lanes: initial wake, parking when
// work runs dry, tick-driven resume, and shutdown on connection loss.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use beamline::miner::{spawn_lane, LaneHandle, MiningLoop};
use beamline::pool::JobSource;
use common::{MockBackend, MockJobSource};

const TICK: Duration = Duration::from_millis(50);

fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn mock_lane(
    source: &Arc<MockJobSource>,
    canned: Vec<Vec<beamline::core::Solution>>,
) -> (LaneHandle, Arc<AtomicU64>) {
    let dispatches = Arc::new(AtomicU64::new(0));
    let dispatches_clone = Arc::clone(&dispatches);
    let handle = spawn_lane(
        0,
        "mock".to_string(),
        999,
        Arc::clone(source) as Arc<dyn JobSource>,
        move || Ok(MockBackend::new(dispatches_clone, canned)),
    )
    .expect("spawn");
    (handle, dispatches)
}

#[test]
fn test_loop_dispatches_all_work_then_parks() {
    let source = MockJobSource::new(true, 3);
    let (handle, dispatches) = mock_lane(&source, vec![vec![[5u32; 32]]]);
    let control = handle.control();

    let mining = MiningLoop::new(vec![handle], Arc::clone(&source) as Arc<dyn JobSource>)
        .with_tick(TICK);
    let supervisor = thread::spawn(move || mining.run());

    assert!(wait_for(Duration::from_secs(5), || {
        dispatches.load(Ordering::SeqCst) == 3 && control.is_paused()
    }));
    // The first dispatch's canned solution was forwarded against its work item.
    assert_eq!(source.handled_count(), 1);
    assert_eq!(source.handled.lock().unwrap()[0].0, 7);

    source.set_connected(false);
    supervisor.join().expect("supervisor join");
}

#[test]
fn test_tick_resumes_parked_lane() {
    let source = MockJobSource::new(true, 1);
    let (handle, dispatches) = mock_lane(&source, Vec::new());
    let control = handle.control();

    let mining = MiningLoop::new(vec![handle], Arc::clone(&source) as Arc<dyn JobSource>)
        .with_tick(TICK);
    let supervisor = thread::spawn(move || mining.run());

    assert!(wait_for(Duration::from_secs(5), || {
        dispatches.load(Ordering::SeqCst) == 1 && control.is_paused()
    }));

    source.refill_work(2);
    assert!(wait_for(Duration::from_secs(5), || {
        dispatches.load(Ordering::SeqCst) == 3 && control.is_paused()
    }));

    source.set_connected(false);
    supervisor.join().expect("supervisor join");
}

#[test]
fn test_resume_sweep_runs_during_reconnection() {
    let source = MockJobSource::new(true, 1);
    let (handle, dispatches) = mock_lane(&source, Vec::new());
    let control = handle.control();

    let mining = MiningLoop::new(vec![handle], Arc::clone(&source) as Arc<dyn JobSource>)
        .with_tick(TICK);
    let supervisor = thread::spawn(move || mining.run());

    assert!(wait_for(Duration::from_secs(5), || {
        dispatches.load(Ordering::SeqCst) == 1 && control.is_paused()
    }));

    // A reconnect must not keep a parked lane idle once work is available;
    // only the rate report sits the reconnect out.
    source.set_connecting(true);
    source.refill_work(1);
    assert!(wait_for(Duration::from_secs(5), || {
        dispatches.load(Ordering::SeqCst) == 2
    }));

    source.set_connecting(false);
    source.set_connected(false);
    supervisor.join().expect("supervisor join");
}

#[test]
fn test_failed_lane_stays_down() {
    let source = MockJobSource::new(true, 5);
    let dispatches = Arc::new(AtomicU64::new(0));
    let dispatches_clone = Arc::clone(&dispatches);
    let handle = spawn_lane(
        0,
        "dying".to_string(),
        999,
        Arc::clone(&source) as Arc<dyn JobSource>,
        move || Ok(common::FailingBackend::new(dispatches_clone)),
    )
    .expect("spawn");
    let control = handle.control();

    let mining = MiningLoop::new(vec![handle], Arc::clone(&source) as Arc<dyn JobSource>)
        .with_tick(TICK);
    let supervisor = thread::spawn(move || mining.run());

    assert!(wait_for(Duration::from_secs(5), || control.is_failed()));
    assert_eq!(dispatches.load(Ordering::SeqCst), 1);

    // Work keeps flowing, but the failed lane is never resumed.
    source.refill_work(5);
    thread::sleep(TICK * 4);
    assert_eq!(dispatches.load(Ordering::SeqCst), 1);
    assert!(control.is_failed());

    source.set_connected(false);
    supervisor.join().expect("supervisor join");
}

#[test]
fn test_loop_exits_when_connection_lost() {
    let source = MockJobSource::new(true, 0);
    let (handle, dispatches) = mock_lane(&source, Vec::new());

    let mining = MiningLoop::new(vec![handle], Arc::clone(&source) as Arc<dyn JobSource>)
        .with_tick(TICK);
    let supervisor = thread::spawn(move || mining.run());

    thread::sleep(TICK);
    source.set_connected(false);

    let start = Instant::now();
    supervisor.join().expect("supervisor join");
    assert!(start.elapsed() < Duration::from_secs(5));
    // No work ever existed, so nothing was dispatched.
    assert_eq!(dispatches.load(Ordering::SeqCst), 0);
}
