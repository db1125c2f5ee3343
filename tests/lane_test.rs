// Beamline Miner - Free and Open Source Software Statement
//
// File: tests/lane_test.rs
// Version: 1.1.0
//
// Lane spawning: backend construction on the worker thread and the
// no-handle-on-failure guarantee.

mod common;

use anyhow::anyhow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use beamline::miner::spawn_lane;
use beamline::pool::JobSource;
use common::{MockBackend, MockJobSource};

#[test]
fn test_failed_backend_init_yields_no_handle() {
    let source = MockJobSource::new(true, 0) as Arc<dyn JobSource>;
    let result = spawn_lane(0, "broken".to_string(), 999, source, || {
        Err::<MockBackend, _>(anyhow!("program build failed"))
    });
    let err = result.expect_err("a failed pipeline build must not produce a lane");
    assert!(err.to_string().contains("program build failed"));
}

#[test]
fn test_spawned_lane_starts_idle() {
    let source = MockJobSource::new(true, 0) as Arc<dyn JobSource>;
    let dispatches = Arc::new(AtomicU64::new(0));
    let dispatches_clone = Arc::clone(&dispatches);
    let handle = spawn_lane(3, "mock".to_string(), 999, source, move || {
        Ok(MockBackend::new(dispatches_clone, Vec::new()))
    })
    .expect("spawn");

    assert_eq!(handle.index, 3);
    assert_eq!(handle.intensity, 999);
    // No wake has been sent; the worker must not dispatch on its own.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(dispatches.load(Ordering::SeqCst), 0);
    assert!(!handle.control.is_paused());
}
