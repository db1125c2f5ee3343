// Beamline Miner - Free and Open Source Software Statement
//
// File: src/core/mod.rs
// Version: 1.1.0
//
// Core module exports for the Beamline miner.

pub mod types;

pub use types::{
    Args, DeviceSelection, ServerEndpoint, Solution, UsageError, WorkItem, HEADER_BYTES,
    INTENSITY_MAX, SOLUTION_WORDS,
};
