// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/miner/catalog.rs
// Version: 1.1.0
//
// OpenCL platform/device enumeration and eligibility classification. Every
// probe failure is a diagnostic plus an exclusion, never a process abort.
//
// Tree Location:
// - src/miner/catalog.rs (device discovery)
// - Depends on: opencl3, anyhow, log

use anyhow::{Error, Result};
use log::{info, warn};
use opencl3::{
    device::{
        get_device_data, Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
    },
    platform::get_platforms,
};

use crate::core::DeviceSelection;
use crate::miner::pipeline::{select_tier, Tier};
use crate::utils::format::FormatUtils;

const LOG_TARGET: &str = "beamline::catalog";

/// AMD vendor extension exposing board name and free memory.
const AMD_ATTRIBUTE_EXTENSION: &str = "cl_amd_device_attribute_query";
/// CL_DEVICE_BOARD_NAME_AMD
const CL_DEVICE_BOARD_NAME_AMD: u32 = 0x4038;
/// CL_DEVICE_GLOBAL_FREE_MEMORY_AMD, reported in KiB.
const CL_DEVICE_GLOBAL_FREE_MEMORY_AMD: u32 = 0x4039;

/// One eligible device: its probe results plus the intensity assigned to it.
pub struct DeviceProbe {
    pub ordinal: u32,
    pub name: String,
    pub tier: Tier,
    pub intensity: i32,
    pub device: Device,
}

/// Enumerates OpenCL devices and classifies each into a memory tier.
pub struct DeviceCatalog;

impl DeviceCatalog {
    /// Probe every platform and return the devices that are selected,
    /// memory-eligible, and (unless `allow_cpu`) GPUs. Device ordinals are
    /// assigned in enumeration order across platforms so they are stable for
    /// `--devices`.
    pub fn detect(
        selection: &DeviceSelection,
        allow_cpu: bool,
        force_3g: bool,
    ) -> Result<Vec<DeviceProbe>> {
        let platforms = get_platforms()
            .map_err(|e| Error::msg(format!("Failed to get OpenCL platforms: {}", e)))?;
        info!(target: LOG_TARGET, "Found {} OpenCL platform(s)", platforms.len());

        let device_type = if allow_cpu {
            CL_DEVICE_TYPE_ALL
        } else {
            CL_DEVICE_TYPE_GPU
        };

        let mut probes = Vec::new();
        let mut ordinal: u32 = 0;
        for platform in &platforms {
            let platform_name = platform.name().unwrap_or_else(|_| "Unknown".to_string());
            let device_ids = match platform.get_devices(device_type) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Platform {}: device query failed: {}", platform_name, e);
                    continue;
                }
            };
            info!(target: LOG_TARGET, "Platform {}: {} device(s)", platform_name, device_ids.len());

            for id in device_ids {
                let device = Device::new(id);
                if let Some(probe) = Self::probe(device, ordinal, selection, allow_cpu, force_3g) {
                    probes.push(probe);
                }
                ordinal += 1;
            }
        }
        Ok(probes)
    }

    /// Classify one device. Returns `None` when the device is deselected,
    /// unsupported, or memory-ineligible; every exclusion is logged.
    fn probe(
        device: Device,
        ordinal: u32,
        selection: &DeviceSelection,
        allow_cpu: bool,
        force_3g: bool,
    ) -> Option<DeviceProbe> {
        let name = Self::device_name(&device);

        let intensity = match selection.pick(ordinal) {
            Some(i) => i,
            None => {
                info!(target: LOG_TARGET, "Device {} ({}): not selected, skipping", ordinal, name);
                return None;
            }
        };

        if !allow_cpu {
            match device.dev_type() {
                Ok(t) if t & CL_DEVICE_TYPE_CPU != 0 => {
                    info!(target: LOG_TARGET, "Device {} ({}): CPU device, skipping (use --enable-cpu)", ordinal, name);
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(target: LOG_TARGET, "Device {} ({}): type query failed, skipping: {}", ordinal, name, e);
                    return None;
                }
            }
        }

        let memory = Self::usable_memory(&device);
        let tier = match select_tier(memory, force_3g) {
            Some(tier) => tier,
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Device {} ({}): insufficient memory ({}), excluded",
                    ordinal,
                    name,
                    FormatUtils::format_memory(memory)
                );
                return None;
            }
        };

        info!(
            target: LOG_TARGET,
            "✅ Device {} ({}): {} usable, {} pipeline, intensity {}",
            ordinal,
            name,
            FormatUtils::format_memory(memory),
            tier.name(),
            intensity
        );

        Some(DeviceProbe {
            ordinal,
            name,
            tier,
            intensity,
            device,
        })
    }

    /// Marketing board name on AMD (the generic name is often just the ASIC
    /// family), generic device name elsewhere.
    fn device_name(device: &Device) -> String {
        if Self::has_extension(device, AMD_ATTRIBUTE_EXTENSION) {
            if let Ok(bytes) = get_device_data(device.id(), CL_DEVICE_BOARD_NAME_AMD) {
                let board = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\0')
                    .trim()
                    .to_string();
                if !board.is_empty() {
                    return board;
                }
            }
        }
        device.name().unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Memory available for the pipeline. On AMD this is the vendor-reported
    /// free memory (KiB) capped at the total; any query failure falls back to
    /// the total global memory size.
    fn usable_memory(device: &Device) -> u64 {
        let total = device.global_mem_size().unwrap_or(0);
        if Self::has_extension(device, AMD_ATTRIBUTE_EXTENSION) {
            if let Ok(bytes) = get_device_data(device.id(), CL_DEVICE_GLOBAL_FREE_MEMORY_AMD) {
                if bytes.len() >= 8 {
                    let kib = u64::from_le_bytes([
                        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6],
                        bytes[7],
                    ]);
                    return (kib * 1024).min(total);
                }
            }
        }
        total
    }

    fn has_extension(device: &Device, extension: &str) -> bool {
        device
            .extensions()
            .map(|e| e.split_whitespace().any(|x| x == extension))
            .unwrap_or(false)
    }
}
