//! Shared error and command-line types

pub mod cli;
pub mod error;

pub use cli::{CheckerArgs, CommonArgs, CompressorArgs, DumpArgs, EmulatorArgs};
pub use error::{CodecError, CodecResult};
