//! `cfd`: command-line interface for the CFD inference accelerator.
//!
//! ```text
//! USAGE:
//!   cfd regs [--engine N]                       Print the register map
//!   cfd status                                  Read and decode STATUS
//!   cfd predict --input FILE [--simulate]       Run predictions, print results
//!   cfd stream --input FILE --output PATH       Run predictions, frame them onto a link
//! ```
//!
//! Block address, Q-format and device node come from `CFD_*` environment
//! variables (see `cfd_driver::config`); flags override them.

use anyhow::{Context, Result};
use cfd_chip::regs::{self, input_offset, output_offset, FEATURE_COUNT, RESULT_COUNT};
use cfd_chip::{axi, EngineIndex};
use cfd_driver::samples::load_samples;
use cfd_driver::{
    select_backend, BackendSelection, BatchRunner, CfdModel, DriverConfig, RegisterIo,
    ResultStreamer, WaitStrategy, WriteSink,
};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cfd", about = "CFD inference accelerator CLI", version)]
struct Cli {
    #[command(flatten)]
    block: BlockArgs,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct BlockArgs {
    /// Physical base address of the register block (overrides CFD_BASE_ADDR).
    #[arg(long, global = true, value_parser = parse_addr)]
    base_addr: Option<u64>,

    /// Q-format fractional bits (overrides CFD_FRACTIONAL_BITS).
    #[arg(long, global = true)]
    fractional_bits: Option<u32>,

    /// Device node to map (overrides CFD_DEVICE).
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Use the simulated block instead of hardware.
    #[arg(long, global = true)]
    simulate: bool,

    /// Give up waiting after this many status polls instead of spinning forever.
    #[arg(long, global = true)]
    bounded: Option<u64>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the register map (input windows are reversed).
    Regs {
        /// Only this engine (0-3).
        #[arg(long)]
        engine: Option<usize>,
    },
    /// Read and decode the status register.
    Status,
    /// Run predictions over a sample file and print the results.
    Predict {
        /// Sample file: eight numbers per line.
        #[arg(long)]
        input: PathBuf,
        /// Warn when engines other than engine 0 are still busy after a wait.
        #[arg(long)]
        verify_idle: bool,
    },
    /// Run predictions and stream the framed results to a link.
    Stream {
        /// Sample file: eight numbers per line.
        #[arg(long)]
        input: PathBuf,
        /// Serial device or file receiving the stream (e.g. /dev/ttyPS1).
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let config = driver_config(&cli.block)?;

    match cli.command {
        Cmd::Regs { engine } => cmd_regs(&config, engine)?,
        Cmd::Status => cmd_status(&cli.block, &config)?,
        Cmd::Predict { input, verify_idle } => {
            cmd_predict(&cli.block, &config, &input, verify_idle)?
        }
        Cmd::Stream { input, output } => cmd_stream(&cli.block, &config, &input, &output)?,
    }

    Ok(())
}

fn parse_addr(s: &str) -> Result<u64, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u64::from_str_radix(&digits.replace('_', ""), radix)
        .map_err(|e| format!("bad address '{s}': {e}"))
}

fn driver_config(args: &BlockArgs) -> Result<DriverConfig> {
    let mut config = DriverConfig::from_env().context("Reading CFD_* environment")?;
    if let Some(addr) = args.base_addr {
        config.base_addr = addr;
    }
    if let Some(bits) = args.fractional_bits {
        config.fractional_bits = bits;
    }
    if let Some(device) = &args.device {
        config.device_path.clone_from(device);
    }
    if let Some(max_polls) = args.bounded {
        config.wait = WaitStrategy::Bounded { max_polls };
    }
    config.validate()?;
    Ok(config)
}

fn open_model(args: &BlockArgs, config: &DriverConfig) -> Result<CfdModel<Box<dyn RegisterIo>>> {
    let selection = if args.simulate {
        BackendSelection::Software
    } else {
        BackendSelection::Mapped
    };
    let io = select_backend(selection, config).with_context(|| {
        format!(
            "Cannot open CFD block at {:#x} via {} (use --simulate without hardware)",
            config.base_addr,
            config.device_path.display()
        )
    })?;
    Ok(CfdModel::with_config(io, config)?)
}

fn cmd_regs(config: &DriverConfig, engine: Option<usize>) -> Result<()> {
    let engines: Vec<EngineIndex> = match engine {
        Some(i) => vec![cfd_driver::engine(i)?],
        None => EngineIndex::ALL.to_vec(),
    };

    let addr = |index: usize| axi::register_addr(config.base_addr, index);
    println!(
        "r{:<3} {:#010x}  CONTROL  start mask, pulsed then cleared",
        regs::CONTROL,
        addr(regs::CONTROL)
    );
    println!(
        "r{:<3} {:#010x}  STATUS   bit 2e+1 = engine e busy",
        regs::STATUS,
        addr(regs::STATUS)
    );
    for e in engines {
        println!();
        for f in (0..FEATURE_COUNT).rev() {
            let idx = input_offset(e, f);
            println!("r{idx:<3} {:#010x}  {e} x{f}", addr(idx));
        }
        for r in 0..RESULT_COUNT {
            let idx = output_offset(e, r);
            println!("r{idx:<3} {:#010x}  {e} y{r}", addr(idx));
        }
    }
    Ok(())
}

fn cmd_status(args: &BlockArgs, config: &DriverConfig) -> Result<()> {
    let model = open_model(args, config)?;
    let status = model.status()?;
    println!("STATUS = {status:#010x}");
    for e in EngineIndex::ALL {
        let state = if regs::status::is_busy(status, e) { "busy" } else { "idle" };
        println!("  {e}: {state}");
    }
    Ok(())
}

fn cmd_predict(
    args: &BlockArgs,
    config: &DriverConfig,
    input: &Path,
    verify_idle: bool,
) -> Result<()> {
    let samples = load_samples(input).with_context(|| format!("Loading {}", input.display()))?;
    let mut model = open_model(args, config)?;
    let results = BatchRunner::from_config(config)
        .verify_all_idle(verify_idle)
        .run(&mut model, &samples)?;

    for (i, r) in results.iter().enumerate() {
        let [y0, y1, y2, y3] = r.values;
        println!("{i:>6}  {y0:>12.6} {y1:>12.6} {y2:>12.6} {y3:>12.6}");
    }
    if results.len() < samples.len() {
        tracing::warn!("{} trailing samples not run", samples.len() - results.len());
    }
    Ok(())
}

fn cmd_stream(
    args: &BlockArgs,
    config: &DriverConfig,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let samples = load_samples(input).with_context(|| format!("Loading {}", input.display()))?;
    let mut model = open_model(args, config)?;
    let results = BatchRunner::from_config(config).run(&mut model, &samples)?;

    let link = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(output)
        .with_context(|| format!("Opening {}", output.display()))?;

    println!("Starting transmission of {} results to {}", results.len(), output.display());
    ResultStreamer::stream_all(WriteSink::new(link), &results)?;
    println!("Finished transmission.");
    Ok(())
}
