// Beamline Miner - Free and Open Source Software Statement
//
// File: src/miner/mod.rs
// Version: 1.1.0
//
// Mining engine: device discovery, tier pipelines, lane workers and the
// supervisory loop.

pub mod catalog;
pub mod completion;
pub mod dispatcher;
pub mod lane;
pub mod mining_loop;
pub mod pipeline;
pub mod stats;

pub use catalog::{DeviceCatalog, DeviceProbe};
pub use completion::{finish_dispatch, harvest, throttle_delay, LaneOutcome};
pub use lane::{DeviceLane, LaneBackend, LaneControl, LaneState};
pub use mining_loop::{spawn_lane, LaneHandle, MiningLoop};
pub use pipeline::{
    kernel_names, select_tier, tier_footprint, BufferRole, DevicePipeline, PipelineBuilder, Tier,
    MAX_SOLUTIONS, RESULT_WORDS,
};
pub use stats::{sample_rates, RateReport};
