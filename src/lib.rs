// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/lib.rs
// Version: 1.1.0
//
// Library entry point for the Beamline miner, an Equihash 150/5 OpenCL
// mining host. Declares the core, miner, pool and utils modules and
// re-exports the main public types.
//
// Tree Location:
// - src/lib.rs (library entry point)
// - Submodules: core, miner, pool, utils

pub mod core;
pub mod miner;
pub mod pool;
pub mod utils;

pub use crate::core::{Args, DeviceSelection, ServerEndpoint, Solution, UsageError, WorkItem};
pub use crate::miner::{
    DeviceCatalog, DeviceLane, DeviceProbe, LaneBackend, LaneControl, MiningLoop, PipelineBuilder,
    Tier,
};
pub use crate::pool::{JobSource, StratumClient};

/// Convenience alias used at the binary surface.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Changelog:
// - v1.1.0: Multi-server rotation, lane worker redesign.
// - v1.0.0: Initial OpenCL host with 3G/4G tier pipelines.
