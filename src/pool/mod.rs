// Beamline Miner - Free and Open Source Software Statement
//
// File: src/pool/mod.rs
// Version: 1.1.0
//
// Job sourcing: the `JobSource` contract the mining engine drives, and the
// stratum-style pool client implementing it.

pub mod client;
pub mod messages;

pub use client::StratumClient;
pub use messages::StratumMessage;

use crate::core::{Solution, WorkItem};

/// What the mining engine needs from a work provider. All methods are
/// non-blocking; lane workers and the supervisor call them from their own
/// threads.
pub trait JobSource: Send + Sync {
    /// Begin connecting and fetching work. Idempotent.
    fn start_working(&self);

    /// True while the transport is usable (or still being established).
    fn has_connection(&self) -> bool;

    /// True only during connection establishment.
    fn is_connecting(&self) -> bool;

    /// True when a current job is held.
    fn has_work(&self) -> bool;

    /// A fresh work item under the current job, with a nonce never handed
    /// out before, or `None` when no job is held.
    fn get_work(&self) -> Option<WorkItem>;

    /// Accept one candidate solution found under `work`.
    fn handle_solution(&self, work: &WorkItem, solution: &Solution);
}
