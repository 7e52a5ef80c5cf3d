//! Where a prediction run spends its time.
//!
//! Runs the four-engine batch loop with telemetry enabled and splits the
//! wall time into hardware (start pulse + completion wait), memory
//! (AXI-Lite register traffic), FP ⇄ Q conversion, and everything else.
//!
//! Usage:
//!   cargo run --bin bench_breakdown
//!   cargo run --bin bench_breakdown -- --samples 4096 --input samples.txt
//!   cargo run --bin bench_breakdown -- --simulate
//!
//! Block address / Q-format / device come from `CFD_*` environment variables.

use anyhow::{Context, Result};
use cfd_driver::samples::load_samples;
use cfd_driver::{
    select_backend, BackendSelection, BatchRunner, CfdModel, DriverConfig, InputSample,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const DEFAULT_SAMPLES: usize = 1024;
const WARMUP_BATCHES: usize = 8;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let count = parse_arg(&args, "--samples", DEFAULT_SAMPLES);
    let simulate = args.iter().any(|a| a == "--simulate");
    let input = args
        .windows(2)
        .find(|w| w[0] == "--input")
        .map(|w| w[1].clone());

    let config = DriverConfig::from_env()?;
    let samples = match &input {
        Some(path) => load_samples(Path::new(path)).with_context(|| format!("Loading {path}"))?,
        None => synthetic_samples(count),
    };

    let selection = if simulate {
        BackendSelection::Software
    } else {
        BackendSelection::Mapped
    };
    let io = select_backend(selection, &config)
        .context("Cannot open CFD block (use --simulate without hardware)")?;

    println!("CFD prediction breakdown");
    println!("========================");
    println!("Backend        : {}", io.backend_type());
    println!("Block          : {:#x}", io.base_addr());
    println!("Q-format       : {} fractional bits", config.fractional_bits);
    let runner = BatchRunner::from_config(&config);
    println!("Samples        : {} ({} batches)", samples.len(), samples.len() / 4);
    println!("Wait           : {:?}", runner.wait_strategy());
    println!();

    let mut model = CfdModel::with_config(io, &config)?.with_telemetry();

    // Warmup
    let warmup = synthetic_samples(WARMUP_BATCHES * 4);
    runner.run(&mut model, &warmup)?;
    model.reset_telemetry();

    let results = runner.run(&mut model, &samples)?;
    let report = model
        .telemetry()
        .map(|perf| perf.report())
        .context("telemetry not enabled")?;

    println!(">> Started");
    println!(">> Finished {} predictions", results.len());
    println!();
    println!("{report}");
    println!();
    if report.batches > 0 {
        let per_batch_us = report.total.as_secs_f64() * 1e6 / report.batches as f64;
        println!(
            "Per batch      : {per_batch_us:.2} µs  ({:.0} predictions/s)",
            4.0 * 1e6 / per_batch_us
        );
    }

    Ok(())
}

/// Deterministic inputs spanning the Q16.15 range used in practice.
fn synthetic_samples(n: usize) -> Vec<InputSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 / n.max(1) as f64;
            InputSample::new(std::array::from_fn(|f| {
                let phase = t * std::f64::consts::TAU + f as f64;
                4.0 * phase.sin()
            }))
        })
        .collect()
}

fn parse_arg(args: &[String], flag: &str, default: usize) -> usize {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
