// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/pipeline.rs
// Version: 1.1.0
//
// Tier-specific kernel program compilation and buffer allocation for one
// device. Owns the buffer-role size tables, the memory-tier thresholds and
// the kernel stage sets for both pipeline variants.
//
// Tree Location:
// - src/miner/pipeline.rs (pipeline construction)
// - Depends on: opencl3, anyhow, log

use anyhow::{Error, Result};
use log::{error, info};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::Device,
    kernel::Kernel,
    memory::{Buffer, CL_MEM_READ_WRITE},
    program::Program,
    types::cl_uint,
};
use std::ptr;

const LOG_TARGET: &str = "beamline::pipeline";

/// Embedded kernel source; `-DMEM3G` selects the 3G variant at build time.
const KERNEL_SOURCE: &str = include_str!("../../kernels/opencl/equihash_150_5.cl");

/// Total words in the ResultOutput region: one count word, three reserved
/// words, then up to `MAX_SOLUTIONS` packed 32-word candidates.
pub const RESULT_WORDS: usize = 324;

/// Candidate capacity of the ResultOutput region.
pub const MAX_SOLUTIONS: usize = 10;

/// Memory-capacity class selecting which kernel/buffer variant a device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    T4G,
    T3G,
}

impl Tier {
    /// Program build options selecting this tier's kernel variant.
    pub fn build_options(self) -> &'static str {
        match self {
            Tier::T4G => "",
            Tier::T3G => "-DMEM3G",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::T4G => "4G",
            Tier::T3G => "3G",
        }
    }
}

/// A named device-memory region with a tier-specific fixed element count.
/// Sizes are part of the kernel contract and are never resized at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    RoundA,
    RoundB,
    RoundC,
    IndexTree,
    Staging,
    Counter,
    Results,
}

impl BufferRole {
    pub const ALL: [BufferRole; 7] = [
        BufferRole::RoundA,
        BufferRole::RoundB,
        BufferRole::RoundC,
        BufferRole::IndexTree,
        BufferRole::Staging,
        BufferRole::Counter,
        BufferRole::Results,
    ];

    /// Region size in 32-bit words for the given tier.
    pub fn words(self, tier: Tier) -> usize {
        match (self, tier) {
            (BufferRole::RoundA | BufferRole::RoundB, Tier::T4G) => 4 * 71_303_168,
            (BufferRole::RoundA | BufferRole::RoundB, Tier::T3G) => 4 * 69_599_232,
            (BufferRole::RoundC, Tier::T4G) => 4 * 71_303_168,
            (BufferRole::RoundC, Tier::T3G) => 4 * 52_199_424,
            (BufferRole::IndexTree, Tier::T4G) => 2 * 71_303_168,
            (BufferRole::IndexTree, Tier::T3G) => 2,
            (BufferRole::Staging, _) => 4 * 256,
            (BufferRole::Counter, _) => 49_152,
            (BufferRole::Results, _) => RESULT_WORDS,
        }
    }

    pub fn bytes(self, tier: Tier) -> u64 {
        self.words(tier) as u64 * 4
    }
}

/// Total device-memory footprint of a tier's buffer-role set; this is also
/// the eligibility threshold the device's memory must strictly exceed.
pub fn tier_footprint(tier: Tier) -> u64 {
    BufferRole::ALL.iter().map(|r| r.bytes(tier)).sum()
}

/// Tier eligibility: 4G when memory exceeds the 4G footprint and the 3G
/// variant is not forced; else 3G when memory exceeds the 3G footprint; else
/// the device is excluded.
pub fn select_tier(memory: u64, force_3g: bool) -> Option<Tier> {
    if memory > tier_footprint(Tier::T4G) && !force_3g {
        Some(Tier::T4G)
    } else if memory > tier_footprint(Tier::T3G) {
        Some(Tier::T3G)
    } else {
        None
    }
}

/// Kernel entry points for a tier, in creation order. The 3G variant carries
/// two extra reshaping stages and a tier-specific terminal combine.
pub fn kernel_names(tier: Tier) -> &'static [&'static str] {
    match tier {
        Tier::T4G => &[
            "clearCounter",
            "round0",
            "round1",
            "round2",
            "round3",
            "round4",
            "round5",
            "combine",
        ],
        Tier::T3G => &[
            "clearCounter",
            "round0",
            "round1",
            "round2",
            "round3",
            "round4",
            "round5",
            "combine3G",
            "repack",
            "move",
        ],
    }
}

/// Kernel stage set for one lane, by role rather than by index.
pub struct StageSet {
    pub clear_counter: Kernel,
    pub rounds: Vec<Kernel>,
    pub combine: Kernel,
    pub repack: Option<Kernel>,
    pub mv: Option<Kernel>,
}

/// Buffer role set for one lane.
pub struct RoleBuffers {
    pub round_a: Buffer<cl_uint>,
    pub round_b: Buffer<cl_uint>,
    pub round_c: Buffer<cl_uint>,
    pub index_tree: Buffer<cl_uint>,
    pub staging: Buffer<cl_uint>,
    pub counter: Buffer<cl_uint>,
    pub results: Buffer<cl_uint>,
}

/// Fully constructed compute pipeline for one device.
pub struct DevicePipeline {
    pub tier: Tier,
    pub context: Context,
    pub queue: CommandQueue,
    pub buffers: RoleBuffers,
    pub stages: StageSet,
}

/// Builds the tier-specific kernel program and buffer set for one device.
pub struct PipelineBuilder;

impl PipelineBuilder {
    /// Compile and allocate. A compile failure is non-fatal to the process:
    /// the error carries the build log and the caller simply does not turn
    /// the device into a lane.
    pub fn build(device: &Device, tier: Tier) -> Result<DevicePipeline> {
        info!(target: LOG_TARGET, "   Loading and compiling Equihash 150/5 kernel ({} variant)", tier.name());

        let context = Context::from_device(device)
            .map_err(|e| Error::msg(format!("Failed to create context: {}", e)))?;

        let mut program = Program::create_from_source(&context, KERNEL_SOURCE)
            .map_err(|e| Error::msg(format!("Failed to create program: {}", e)))?;

        if let Err(e) = program.build(context.devices(), tier.build_options()) {
            // Surface the build log so the kernel source can be debugged.
            let mut log = String::new();
            for device_id in context.devices() {
                if let Ok(build_log) = program.get_build_log(*device_id) {
                    log.push_str(&build_log);
                }
            }
            error!(target: LOG_TARGET, "   Program build error, device will not be used. Build log: {}", log);
            return Err(Error::msg(format!("Program build failed: {}: {}", e, log)));
        }
        info!(target: LOG_TARGET, "   Build successful.");

        let queue = CommandQueue::create_default(&context, 0)
            .map_err(|e| Error::msg(format!("Failed to create command queue: {}", e)))?;

        let buffers = Self::allocate_buffers(&context, tier)?;
        let stages = Self::create_stages(&program, tier)?;

        Ok(DevicePipeline {
            tier,
            context,
            queue,
            buffers,
            stages,
        })
    }

    fn allocate_buffers(context: &Context, tier: Tier) -> Result<RoleBuffers> {
        let alloc = |role: BufferRole| -> Result<Buffer<cl_uint>> {
            unsafe {
                Buffer::<cl_uint>::create(
                    context,
                    CL_MEM_READ_WRITE,
                    role.words(tier),
                    ptr::null_mut(),
                )
                .map_err(|e| Error::msg(format!("Failed to allocate {:?} buffer: {}", role, e)))
            }
        };
        Ok(RoleBuffers {
            round_a: alloc(BufferRole::RoundA)?,
            round_b: alloc(BufferRole::RoundB)?,
            round_c: alloc(BufferRole::RoundC)?,
            index_tree: alloc(BufferRole::IndexTree)?,
            staging: alloc(BufferRole::Staging)?,
            counter: alloc(BufferRole::Counter)?,
            results: alloc(BufferRole::Results)?,
        })
    }

    fn create_stages(program: &Program, tier: Tier) -> Result<StageSet> {
        let create = |name: &str| -> Result<Kernel> {
            Kernel::create(program, name)
                .map_err(|e| Error::msg(format!("Failed to create kernel {}: {}", name, e)))
        };
        let rounds = (0..6)
            .map(|i| create(&format!("round{}", i)))
            .collect::<Result<Vec<_>>>()?;
        let (combine, repack, mv) = match tier {
            Tier::T4G => (create("combine")?, None, None),
            Tier::T3G => (
                create("combine3G")?,
                Some(create("repack")?),
                Some(create("move")?),
            ),
        };
        Ok(StageSet {
            clear_counter: create("clearCounter")?,
            rounds,
            combine,
            repack,
            mv,
        })
    }
}
