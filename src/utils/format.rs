// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/utils/format.rs
// Version: 1.1.0
//
// This file provides utility functions for formatting statistics in the
// Beamline miner, located in the utils subdirectory. It formats solution
// rates, memory sizes, and numbers for consistent output in logs.
//
// Tree Location:
// - src/utils/format.rs (formatting utilities)
// - Depends on: std

/// Utility functions for formatting miner statistics
pub struct FormatUtils;

impl FormatUtils {
    /// Format a solution rate in sol/s
    pub fn format_rate(rate: f64) -> String {
        format!("{:.2} sol/s", rate)
    }

    /// Format a memory size in GiB or MiB as appropriate
    pub fn format_memory(bytes: u64) -> String {
        const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
        const MIB: f64 = 1024.0 * 1024.0;
        if bytes as f64 >= GIB {
            format!("{:.1} GiB", bytes as f64 / GIB)
        } else {
            format!("{:.0} MiB", bytes as f64 / MIB)
        }
    }

    /// Format large numbers with suffixes (K, M, B)
    pub fn format_number(num: u64) -> String {
        if num >= 1_000_000_000 {
            format!("{:.1}B", num as f64 / 1_000_000_000.0)
        } else if num >= 1_000_000 {
            format!("{:.1}M", num as f64 / 1_000_000.0)
        } else if num >= 1_000 {
            format!("{:.1}K", num as f64 / 1_000.0)
        } else {
            num.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(FormatUtils::format_rate(12.345), "12.35 sol/s");
        assert_eq!(FormatUtils::format_rate(0.0), "0.00 sol/s");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(FormatUtils::format_memory(4 * 1024 * 1024 * 1024), "4.0 GiB");
        assert_eq!(FormatUtils::format_memory(512 * 1024 * 1024), "512 MiB");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(FormatUtils::format_number(999), "999");
        assert_eq!(FormatUtils::format_number(1_500), "1.5K");
        assert_eq!(FormatUtils::format_number(2_500_000), "2.5M");
    }
}

// Changelog:
// - v1.1.0: Memory formatting for the device catalog logs.
// - v1.0.0: Initial rate and number formatting.
