// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/dispatcher.rs
// Version: 1.1.0
//
// Argument binding and enqueue order for one dispatch. The stage order,
// buffer bindings, launch geometry and flush points are a fixed protocol
// between host and kernels; do not reorder them.
//
// Tree Location:
// - src/miner/dispatcher.rs (dispatch protocol)
// - Depends on: opencl3, anyhow, log

use anyhow::{Error, Result};
use log::debug;
use opencl3::{kernel::ExecuteKernel, types::CL_FALSE};

use crate::core::{Solution, WorkItem};
use crate::miner::completion::harvest;
use crate::miner::lane::{DeviceLane, LaneBackend};
use crate::miner::pipeline::Tier;

const LOG_TARGET: &str = "beamline::dispatcher";

/// Work-group size for all round stages.
const LOCAL_SIZE: usize = 256;
/// Work-group size for the terminal combine stage.
const COMBINE_LOCAL_SIZE: usize = 16;

const CLEAR_GLOBAL: usize = 12_288;
const SEED_GLOBAL: usize = 22_369_536;
const ROUND_GLOBAL: usize = 16_777_216;
const COMBINE_GLOBAL: usize = 4_096;
/// 3G seeding runs the input space in two half-passes.
const SEED_3G_PASS_GLOBAL: usize = 8_388_608;
const MOVE_GLOBAL: usize = 34_799_616;
const REPACK_GLOBAL: usize = 69_599_232;

/// Header words handed to the seed stage, little-endian.
fn header_words(work: &WorkItem) -> [u64; 4] {
    let mut words = [0u64; 4];
    for (i, chunk) in work.header.chunks_exact(8).enumerate() {
        let mut b = [0u8; 8];
        b.copy_from_slice(chunk);
        words[i] = u64::from_le_bytes(b);
    }
    words
}

impl DeviceLane {
    fn enqueue_4g(&mut self, work: &WorkItem) -> Result<()> {
        let header = header_words(work);
        let q = &self.pipeline.queue;
        let b = &self.pipeline.buffers;
        let s = &self.pipeline.stages;

        unsafe {
            ExecuteKernel::new(&s.clear_counter)
                .set_arg(&b.counter)
                .set_arg(&b.results)
                .set_global_work_size(CLEAR_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[0])
                .set_arg(&b.round_a)
                .set_arg(&b.round_c)
                .set_arg(&b.counter)
                .set_arg(&header)
                .set_arg(&work.nonce)
                .set_global_work_size(SEED_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[1])
                .set_arg(&b.round_a)
                .set_arg(&b.round_c)
                .set_arg(&b.round_b)
                .set_arg(&b.index_tree)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            q.flush()?;

            ExecuteKernel::new(&s.rounds[2])
                .set_arg(&b.round_b)
                .set_arg(&b.round_a)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[3])
                .set_arg(&b.round_a)
                .set_arg(&b.round_b)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[4])
                .set_arg(&b.round_b)
                .set_arg(&b.round_c)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[5])
                .set_arg(&b.round_c)
                .set_arg(&b.staging)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.combine)
                .set_arg(&b.round_a)
                .set_arg(&b.round_b)
                .set_arg(&b.round_c)
                .set_arg(&b.index_tree)
                .set_arg(&b.staging)
                .set_arg(&b.counter)
                .set_arg(&b.results)
                .set_global_work_size(COMBINE_GLOBAL)
                .set_local_work_size(COMBINE_LOCAL_SIZE)
                .enqueue_nd_range(q)?;
        }
        Ok(())
    }

    fn enqueue_3g(&mut self, work: &WorkItem) -> Result<()> {
        let header = header_words(work);
        let q = &self.pipeline.queue;
        let b = &self.pipeline.buffers;
        let s = &self.pipeline.stages;
        let repack = s
            .repack
            .as_ref()
            .ok_or_else(|| Error::msg("3G pipeline missing repack stage"))?;
        let mv = s
            .mv
            .as_ref()
            .ok_or_else(|| Error::msg("3G pipeline missing move stage"))?;

        unsafe {
            ExecuteKernel::new(&s.clear_counter)
                .set_arg(&b.counter)
                .set_arg(&b.results)
                .set_global_work_size(CLEAR_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            // Seeding and the first pairing round run twice over half the
            // input space each, selected by the pass flag.
            for pass in 0u32..2 {
                ExecuteKernel::new(&s.rounds[0])
                    .set_arg(&b.round_a)
                    .set_arg(&b.counter)
                    .set_arg(&header)
                    .set_arg(&work.nonce)
                    .set_arg(&pass)
                    .set_global_work_size(SEED_GLOBAL)
                    .set_local_work_size(LOCAL_SIZE)
                    .enqueue_nd_range(q)?;

                ExecuteKernel::new(&s.rounds[1])
                    .set_arg(&b.round_a)
                    .set_arg(&b.round_b)
                    .set_arg(&b.round_c)
                    .set_arg(&b.counter)
                    .set_arg(&pass)
                    .set_global_work_size(SEED_3G_PASS_GLOBAL)
                    .set_local_work_size(LOCAL_SIZE)
                    .enqueue_nd_range(q)?;

                if pass == 0 {
                    q.flush()?;
                }
            }

            ExecuteKernel::new(&s.rounds[2])
                .set_arg(&b.round_b)
                .set_arg(&b.round_a)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            // Consolidate the narrower 3G regions before the later rounds:
            // move first, then repack.
            ExecuteKernel::new(mv)
                .set_arg(&b.round_c)
                .set_arg(&b.round_b)
                .set_global_work_size(MOVE_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(repack)
                .set_arg(&b.round_b)
                .set_arg(&b.round_a)
                .set_arg(&b.round_c)
                .set_global_work_size(REPACK_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            q.flush()?;

            ExecuteKernel::new(&s.rounds[3])
                .set_arg(&b.round_a)
                .set_arg(&b.round_b)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[4])
                .set_arg(&b.round_b)
                .set_arg(&b.round_a)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.rounds[5])
                .set_arg(&b.round_a)
                .set_arg(&b.staging)
                .set_arg(&b.counter)
                .set_global_work_size(ROUND_GLOBAL)
                .set_local_work_size(LOCAL_SIZE)
                .enqueue_nd_range(q)?;

            ExecuteKernel::new(&s.combine)
                .set_arg(&b.round_b)
                .set_arg(&b.round_c)
                .set_arg(&b.staging)
                .set_arg(&b.counter)
                .set_arg(&b.results)
                .set_global_work_size(COMBINE_GLOBAL)
                .set_local_work_size(COMBINE_LOCAL_SIZE)
                .enqueue_nd_range(q)?;
        }
        Ok(())
    }
}

impl LaneBackend for DeviceLane {
    /// Enqueue one full search and a non-blocking read-back of the result
    /// region, then flush. Returns as soon as the commands are queued; the
    /// read's event becomes the lane's pending completion. `host_results` is
    /// not touched again until that event has completed.
    fn dispatch(&mut self, work: &WorkItem) -> Result<()> {
        debug!(
            target: LOG_TARGET,
            "Device {}: dispatch nonce {} (job {})", self.ordinal, work.nonce, work.job_id
        );
        match self.pipeline.tier {
            Tier::T4G => self.enqueue_4g(work)?,
            Tier::T3G => self.enqueue_3g(work)?,
        }

        let event = unsafe {
            self.pipeline
                .queue
                .enqueue_read_buffer(
                    &self.pipeline.buffers.results,
                    CL_FALSE,
                    0,
                    &mut self.host_results,
                    &[],
                )
                .map_err(|e| Error::msg(format!("Failed to enqueue result read: {}", e)))?
        };
        self.pipeline.queue.flush()?;
        self.pending = Some(event);
        Ok(())
    }

    fn wait_results(&mut self) -> Result<Vec<Solution>> {
        let event = self
            .pending
            .take()
            .ok_or_else(|| Error::msg("wait_results without an in-flight dispatch"))?;
        event
            .wait()
            .map_err(|e| Error::msg(format!("Result read failed: {}", e)))?;
        Ok(harvest(&self.host_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HEADER_BYTES;

    #[test]
    fn test_header_words_little_endian() {
        let mut header = [0u8; HEADER_BYTES];
        header[0] = 0x01;
        header[8] = 0x02;
        header[31] = 0xff;
        let work = WorkItem {
            job_id: 1,
            header,
            nonce: 0,
        };
        let words = header_words(&work);
        assert_eq!(words[0], 0x01);
        assert_eq!(words[1], 0x02);
        assert_eq!(words[3], 0xff00_0000_0000_0000);
    }
}
