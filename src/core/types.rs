// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/core/types.rs
// Version: 1.1.0
//
// Core data structures for the Beamline miner: command-line arguments,
// server endpoints, device selection / intensity resolution, work items and
// solutions.
//
// Tree Location:
// - src/core/types.rs (core data structures)
// - Depends on: clap, serde, thiserror

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Header material captured per work item, in bytes.
pub const HEADER_BYTES: usize = 32;

/// Words per candidate solution extracted from the result buffer.
pub const SOLUTION_WORDS: usize = 32;

/// Highest intensity value, meaning no throttle between dispatches.
pub const INTENSITY_MAX: i32 = 999;

/// One candidate answer: a fixed 32-word index vector.
pub type Solution = [u32; SOLUTION_WORDS];

/// One unit of search input, captured once per dispatch.
///
/// `job_id` is an opaque descriptor owned by the job source; the core never
/// interprets it beyond handing it back with solutions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub job_id: u64,
    pub header: [u8; HEADER_BYTES],
    pub nonce: u64,
}

/// Command-line arguments for the Beamline miner
#[derive(Parser, Debug)]
#[command(
    name = "beamline",
    version,
    about = "Beam-style Equihash 150/5 OpenCL GPU mining host",
    long_about = "Beamline drives Equihash 150/5 proof-of-work search across all eligible\n\
                  OpenCL devices, fetching work from one or more stratum servers and\n\
                  reporting candidate solutions back.\n\n\
                  Examples:\n\
                    beamline --server pool.example.com:3333:YOUR_API_KEY\n\
                    beamline --server pool.example.com:3333:KEY --devices 0,2 --intensity 999,750"
)]
pub struct Args {
    /// Stratum server, port, and API key (required; repeatable for failover)
    #[arg(
        long = "server",
        value_name = "HOST:PORT:KEY",
        help = "The stratum server, port, and API key (repeatable)"
    )]
    pub server: Vec<String>,

    /// Comma-separated list of device ordinals to mine on (default: all)
    #[arg(
        long = "devices",
        value_name = "NUMBERS",
        value_delimiter = ',',
        help = "Devices that should be used for mining (default: all)"
    )]
    pub devices: Vec<u32>,

    /// Per-device intensity 0-999; one value is shared across all devices
    #[arg(
        long = "intensity",
        value_name = "VALUES",
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Miner intensity(ies), 0 to 999 (default: 999, no throttle)"
    )]
    pub intensity: Vec<i32>,

    /// Force the 3G kernel variant even on devices with more memory
    #[arg(long = "force3G", help = "Force the 3GB kernel variant on all devices")]
    pub force_3g: bool,

    /// Also mine on OpenCL CPU devices
    #[arg(long = "enable-cpu", help = "Enable mining on OpenCL CPU devices")]
    pub enable_cpu: bool,

    /// Verbose debug logging
    #[arg(long, help = "Print debugging info")]
    pub debug: bool,
}

/// CLI validation failure with the historical exit-code values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("Parameter --server missing")]
    MissingServer,
    #[error("Parameter --intensity invalid value")]
    InvalidIntensity,
}

impl UsageError {
    pub fn exit_code(&self) -> i32 {
        match self {
            UsageError::MissingServer => 0x1,
            UsageError::InvalidIntensity => 0x4,
        }
    }
}

/// One `--server` entry, parsed from `host:port:key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub key: String,
}

impl std::fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerEndpoint {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let host = parts.next().filter(|h| !h.is_empty());
        let port = parts.next().and_then(|p| p.parse::<u16>().ok());
        let key = parts.next();
        match (host, port, key) {
            (Some(host), Some(port), Some(key)) => Ok(ServerEndpoint {
                host: host.to_string(),
                port,
                key: key.to_string(),
            }),
            _ => Err(UsageError::MissingServer),
        }
    }
}

/// Which devices to mine on and at what intensity.
///
/// Resolution rules: an explicit per-device value from a matching list; else a
/// single shared value for all devices; else the default maximum (999, no
/// throttle). An empty selection list means every detected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    selected: Vec<u32>,
    intensities: Vec<i32>,
}

impl DeviceSelection {
    pub fn from_args(selected: &[u32], intensities: &[i32]) -> Result<Self, UsageError> {
        if intensities
            .iter()
            .any(|&i| !(0..=INTENSITY_MAX).contains(&i))
        {
            return Err(UsageError::InvalidIntensity);
        }
        let intensities = match intensities.len() {
            0 => vec![INTENSITY_MAX],
            1 => intensities.to_vec(),
            n if !selected.is_empty() && n == selected.len() => intensities.to_vec(),
            _ => return Err(UsageError::InvalidIntensity),
        };
        Ok(Self {
            selected: selected.to_vec(),
            intensities,
        })
    }

    /// All devices, default intensity.
    pub fn all_devices() -> Self {
        Self {
            selected: Vec::new(),
            intensities: vec![INTENSITY_MAX],
        }
    }

    pub fn selects_all(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn selected(&self) -> &[u32] {
        &self.selected
    }

    /// Intensity for a device ordinal, or `None` if the device is deselected.
    pub fn pick(&self, ordinal: u32) -> Option<i32> {
        if self.selected.is_empty() {
            return Some(self.intensities[0]);
        }
        let pos = self.selected.iter().position(|&d| d == ordinal)?;
        if self.intensities.len() == self.selected.len() {
            Some(self.intensities[pos])
        } else {
            Some(self.intensities[0])
        }
    }
}

impl Args {
    /// Validate the argument set into parsed server endpoints and a device
    /// selection. A malformed `--server` entry counts as missing, matching the
    /// historical behaviour of leaving the host unset.
    pub fn validate(&self) -> Result<(Vec<ServerEndpoint>, DeviceSelection), UsageError> {
        let servers: Vec<ServerEndpoint> = self
            .server
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if servers.is_empty() {
            return Err(UsageError::MissingServer);
        }
        let selection = DeviceSelection::from_args(&self.devices, &self.intensity)?;
        Ok((servers, selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_endpoint_parsing() {
        let ep: ServerEndpoint = "pool.example.com:3333:abcdef".parse().unwrap();
        assert_eq!(ep.host, "pool.example.com");
        assert_eq!(ep.port, 3333);
        assert_eq!(ep.key, "abcdef");
        assert!("pool.example.com:3333".parse::<ServerEndpoint>().is_err());
        assert!("pool.example.com:notaport:key".parse::<ServerEndpoint>().is_err());
    }

    #[test]
    fn test_intensity_defaults_to_max() {
        let sel = DeviceSelection::from_args(&[], &[]).unwrap();
        assert_eq!(sel.pick(0), Some(INTENSITY_MAX));
        assert_eq!(sel.pick(7), Some(INTENSITY_MAX));
    }

    #[test]
    fn test_intensity_out_of_range() {
        assert_eq!(
            DeviceSelection::from_args(&[], &[1000]),
            Err(UsageError::InvalidIntensity)
        );
        assert_eq!(
            DeviceSelection::from_args(&[], &[-1]),
            Err(UsageError::InvalidIntensity)
        );
    }

    #[test]
    fn test_deselected_device() {
        let sel = DeviceSelection::from_args(&[0, 2], &[999, 500]).unwrap();
        assert_eq!(sel.pick(0), Some(999));
        assert_eq!(sel.pick(2), Some(500));
        assert_eq!(sel.pick(1), None);
    }
}
