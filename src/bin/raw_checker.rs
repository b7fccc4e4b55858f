//! tof-raw-checker - decode and check a raw TOF file
//!
//! Usage:
//!   tof-raw-checker -i run.raw           # text report
//!   tof-raw-checker -i run.raw --json    # JSON report
//!   tof-raw-checker -i run.raw -v        # dump every word (trace level)
//!
//! Corrupt events are reported and skipped; the whole file is always read.

use std::fs::File;
use std::io::{sink, BufReader};

use clap::Parser;
use tof_codec::common::CheckerArgs;
use tof_codec::config::Config;
use tof_codec::converter::Converter;
use tracing_subscriber::EnvFilter;

/// Raw file checker
#[derive(Parser, Debug)]
#[command(name = "tof-raw-checker", about = "Decode and check a raw TOF file")]
#[command(version)]
struct Args {
    #[command(flatten)]
    checker: CheckerArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let verbose = args.checker.common.verbose;
    let level = if verbose { "tof_codec=trace" } else { "tof_codec=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let mut config = Config::load_or_default(&args.checker.common.config_file)?;
    config.decoder.dump_enabled |= verbose;

    let mut converter = Converter::check_only(config.decoder);
    let mut reader = BufReader::new(File::open(&args.checker.input)?);
    converter.process_reader(&mut reader, &mut sink())?;

    let report = converter.report();
    if args.checker.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary_line());
        print!("{}", report.checker.report());
    }
    Ok(())
}
