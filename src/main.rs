// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/main.rs
// Version: 1.1.0
//
// Binary entry point: argument validation, logging setup, device discovery,
// lane spawning and host rotation. The process keeps cycling through the
// configured servers until killed; a lost connection moves to the next one.
//
// Tree Location:
// - src/main.rs (binary entry point)
// - Depends on: clap, tokio, tracing-subscriber, anyhow

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use beamline::core::{Args, DeviceSelection, ServerEndpoint};
use beamline::miner::{
    spawn_lane, DeviceCatalog, DeviceLane, LaneHandle, MiningLoop, PipelineBuilder,
};
use beamline::pool::{JobSource, StratumClient};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let (servers, selection) = match args.validate() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run with --help for usage.");
            std::process::exit(e.exit_code());
        }
    };

    info!("⚒️  Beamline Equihash 150/5 OpenCL miner v{}", env!("CARGO_PKG_VERSION"));
    for server in &servers {
        info!("   Server: {}", server);
    }
    if selection.selects_all() {
        info!("   Devices: all");
    } else {
        info!("   Devices: {:?}", selection.selected());
    }
    if args.force_3g {
        info!("   Forcing the 3GB kernel variant on all devices");
    }

    let mut first_pass = true;
    loop {
        for endpoint in &servers {
            run_host(endpoint, &selection, &args, first_pass).await;
            first_pass = false;
            info!("Switching host...");
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

/// One rotation step: connect to a server, bring up the lanes, and mine
/// until the connection is lost.
async fn run_host(
    endpoint: &ServerEndpoint,
    selection: &DeviceSelection,
    args: &Args,
    fatal_on_empty: bool,
) {
    let client: Arc<dyn JobSource> = Arc::new(StratumClient::new(endpoint.clone()));

    let probes = match DeviceCatalog::detect(selection, args.enable_cpu, args.force_3g) {
        Ok(probes) => probes,
        Err(e) => {
            error!("Device detection failed: {}", e);
            std::process::exit(1);
        }
    };

    let mut lanes: Vec<LaneHandle> = Vec::new();
    for probe in probes {
        let device = probe.device;
        let tier = probe.tier;
        let ordinal = probe.ordinal;
        let lane_name = probe.name.clone();
        let result = spawn_lane(
            ordinal as usize,
            probe.name,
            probe.intensity,
            Arc::clone(&client),
            move || {
                let pipeline = PipelineBuilder::build(&device, tier)?;
                Ok(DeviceLane::new(pipeline, ordinal, lane_name))
            },
        );
        match result {
            Ok(handle) => lanes.push(handle),
            Err(e) => warn!("Device {}: pipeline setup failed, excluded: {}", ordinal, e),
        }
    }

    if lanes.is_empty() {
        if fatal_on_empty {
            error!("No usable OpenCL devices found, exiting");
            std::process::exit(1);
        }
        warn!("No usable OpenCL devices this round");
        return;
    }
    info!("🚀 {} mining lane(s) ready", lanes.len());

    let mining = MiningLoop::new(lanes, client);
    if let Err(e) = tokio::task::spawn_blocking(move || mining.run()).await {
        error!("Mining loop panicked: {}", e);
    }
}
