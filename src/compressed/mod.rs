//! Compressed TOF format
//!
//! One event is a crate header, a group of (frame header, packed hits) per
//! non-empty (TRM, time frame) pair in increasing TRM then frame order, and a
//! crate trailer with the checker's fault codes.

pub mod decoder;
pub mod encoder;
pub mod format;

pub use decoder::{CompressedDecoder, CompressedEvent, CompressedFrame, CompressedHit};
pub use encoder::{Encoder, EncoderConfig, EncoderStats, OverflowPolicy};
pub use format::{CrateHeader, CrateTrailer, FrameHeader, PackedHit, TOT_BITS};

use thiserror::Error;

/// Default output buffer size in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Compressed encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The event does not fit in what is left of the output buffer
    #[error("Output buffer full: event needs {needed} bytes, {available} available")]
    BufferFull { needed: usize, available: usize },

    /// A value does not fit its packed field and the policy is to reject
    #[error("Field {field} overflow: {value} does not fit in {bits} bits")]
    FieldOverflow {
        field: &'static str,
        value: u32,
        bits: u32,
    },
}

/// Compressed decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated input at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// An event does not start with a tagged word
    #[error("Invalid crate header 0x{word:08x} at offset {offset}")]
    InvalidCrateHeader { word: u32, offset: usize },

    /// Frame header with no hits or a TRM id outside the crate
    #[error("Unexpected frame header 0x{word:08x} at offset {offset}")]
    UnexpectedFrameHeader { word: u32, offset: usize },
}

impl DecodeError {
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, DecodeError::Truncated { .. })
    }
}
