//! CLI argument parsing for the TOF codec tools
//!
//! Each binary has its own Args struct that embeds `CommonArgs` through
//! `#[command(flatten)]`.

use clap::Parser;
use std::path::PathBuf;

/// Arguments shared by every tool
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short = 'f', long = "config", default_value = "tof.toml")]
    pub config_file: PathBuf,

    /// Dump every decoded word at trace level
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Arguments for the synthetic raw data writer
#[derive(Parser, Debug, Clone)]
pub struct EmulatorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output raw file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Number of data pages to write
    #[arg(short = 'n', long = "pages", default_value_t = 100)]
    pub pages: usize,

    /// Override the RNG seed from the config file
    #[arg(long, env = "TOF_EMULATOR_SEED")]
    pub seed: Option<u64>,
}

/// Arguments for the raw file checker
#[derive(Parser, Debug, Clone)]
pub struct CheckerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Input raw file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the raw to compressed converter
#[derive(Parser, Debug, Clone)]
pub struct CompressorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Input raw file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output compressed file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the compressed file dumper
#[derive(Parser, Debug, Clone)]
pub struct DumpArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Input compressed file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// One JSON object per event instead of text
    #[arg(long)]
    pub json: bool,

    /// Stop after this many events
    #[arg(short = 'n', long = "max-events")]
    pub max_events: Option<usize>,
}
