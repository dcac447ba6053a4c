//! Command-line driver for the vm32 emulator: loads an image, optionally attaches a RAM
//! filesystem blob, and runs it to completion (or steps it under the debugger).

mod debugger;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vm32_emu::{Machine, StopReason};

/// Run a vm32 executable image.
#[derive(Debug, Parser)]
#[command(name = "vm32", version, about)]
struct Cli {
    /// Enable verbose (debug-level) logging, overriding RUST_LOG.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Physical memory size, in megabytes.
    #[arg(short = 'm', long = "memory-mb", default_value_t = 128)]
    memory_mb: u32,

    /// Optional RAM-filesystem image, loaded at the top of memory.
    #[arg(short = 'f', long = "fs-image")]
    fs_image: Option<PathBuf>,

    /// Enable the single-step debugger before each instruction.
    #[arg(short = 'g', long)]
    debug: bool,

    /// Path to the executable image to run.
    image: PathBuf,
}

fn init_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(&cli) {
        Ok(reason) => exit_code_for(reason),
        Err(err) => {
            eprintln!("vm32: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<StopReason> {
    let image = fs::read(&cli.image)
        .with_context(|| format!("reading image {}", cli.image.display()))?;
    let fs_image = cli
        .fs_image
        .as_ref()
        .map(|path| fs::read(path).with_context(|| format!("reading fs image {}", path.display())))
        .transpose()?;

    let mut machine = Machine::new(cli.memory_mb);
    machine
        .load(&image, fs_image.as_deref())
        .context("loading image")?;

    info!(image = %cli.image.display(), memory_mb = cli.memory_mb, "starting vm32");

    let reason = if cli.debug {
        debugger::run(&mut machine)
    } else {
        machine.run()
    };

    info!(?reason, cycle = machine.cpu.cycle, "vm32 stopped");
    Ok(reason)
}

fn exit_code_for(reason: StopReason) -> ExitCode {
    match reason {
        StopReason::Halt | StopReason::ConsoleEscape => ExitCode::SUCCESS,
        StopReason::FatalFault(_) => ExitCode::from(1),
    }
}
