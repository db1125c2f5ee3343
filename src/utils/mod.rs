// Beamline Miner - Free and Open Source Software Statement
//
// File: src/utils/mod.rs
// Version: 1.1.0
//
// Shared utility functions. Declares the format submodule used by the
// catalog and the rate reporting.

pub mod format;
