//! tof-emulator - writes synthetic raw TOF pages to a file
//!
//! Usage:
//!   tof-emulator -o run.raw                    # 100 pages, config defaults
//!   tof-emulator -o run.raw -n 1000 --seed 7   # 1000 pages with a fixed seed
//!   tof-emulator -f tof.toml -o run.raw        # emulator settings from file
//!
//! Each data page is followed by a closing RDH-only page.

use std::fs::File;
use std::io::{BufWriter, Write};

use clap::Parser;
use tof_codec::common::EmulatorArgs;
use tof_codec::config::Config;
use tof_codec::emulator::Emulator;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Synthetic raw data writer
#[derive(Parser, Debug)]
#[command(name = "tof-emulator", about = "Write synthetic raw TOF pages")]
#[command(version)]
struct Args {
    #[command(flatten)]
    emulator: EmulatorArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.emulator.common.verbose { "tof_codec=debug" } else { "tof_codec=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let config = Config::load_or_default(&args.emulator.common.config_file)?;
    let mut emulator_config = config.emulator;
    if let Some(seed) = args.emulator.seed {
        emulator_config.seed = seed;
    }

    info!(
        output = %args.emulator.output.display(),
        pages = args.emulator.pages,
        seed = emulator_config.seed,
        "Starting emulator"
    );

    let mut emulator = Emulator::new(emulator_config);
    let mut writer = BufWriter::new(File::create(&args.emulator.output)?);
    let stats = emulator.write_run(&mut writer, args.emulator.pages)?;
    writer.flush()?;

    println!(
        "Wrote {} pages, {} events, {} pulses ({} bytes) to {}",
        stats.pages,
        stats.events,
        stats.pulses,
        stats.bytes,
        args.emulator.output.display()
    );
    Ok(())
}
