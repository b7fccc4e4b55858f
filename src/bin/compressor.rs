//! tof-compressor - convert a raw TOF file to the compressed format
//!
//! Usage:
//!   tof-compressor -i run.raw -o run.tof
//!   tof-compressor -i run.raw -o run.tof --json   # print the run report as JSON
//!
//! The encoder buffer size and overflow policy come from the [encoder]
//! table of the config file.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use clap::Parser;
use tof_codec::common::CompressorArgs;
use tof_codec::config::Config;
use tof_codec::converter::Converter;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Raw to compressed converter
#[derive(Parser, Debug)]
#[command(name = "tof-compressor", about = "Convert raw TOF data to the compressed format")]
#[command(version)]
struct Args {
    #[command(flatten)]
    compressor: CompressorArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let verbose = args.compressor.common.verbose;
    let level = if verbose { "tof_codec=trace" } else { "tof_codec=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();

    let mut config = Config::load_or_default(&args.compressor.common.config_file)?;
    config.decoder.dump_enabled |= verbose;
    config.encoder.dump_enabled |= verbose;

    info!(
        input = %args.compressor.input.display(),
        output = %args.compressor.output.display(),
        policy = ?config.encoder.overflow_policy,
        "Starting compressor"
    );

    let mut converter = Converter::new(config.decoder, config.encoder);
    let mut reader = BufReader::new(File::open(&args.compressor.input)?);
    let mut writer = BufWriter::new(File::create(&args.compressor.output)?);
    converter.process_reader(&mut reader, &mut writer)?;
    writer.flush()?;

    let report = converter.report();
    if args.compressor.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary_line());
    }
    Ok(())
}
