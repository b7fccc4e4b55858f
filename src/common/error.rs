//! Common error type for the codec pipeline
//!
//! Each stage has its own error enum (raw decoding, compressed encoding and
//! decoding, configuration). `CodecError` wraps them so drivers can use one
//! `Result` type across the whole page loop.

use thiserror::Error;

use crate::compressed::{DecodeError as CompressedDecodeError, EncodeError};
use crate::config::ConfigError;
use crate::raw::DecodeError as RawDecodeError;

/// Errors crossing stage boundaries
#[derive(Error, Debug)]
pub enum CodecError {
    /// Raw page or event decoding failed
    #[error("Raw decode error: {0}")]
    RawDecode(#[from] RawDecodeError),

    /// Compressed event could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Compressed stream could not be read back
    #[error("Compressed decode error: {0}")]
    CompressedDecode(#[from] CompressedDecodeError),

    /// Configuration file problem
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (reports)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Input ran out rather than being corrupt
    pub fn is_end_of_input(&self) -> bool {
        match self {
            Self::RawDecode(e) => e.is_end_of_input(),
            Self::CompressedDecode(e) => e.is_end_of_input(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type alias using CodecError
pub type CodecResult<T> = Result<T, CodecError>;
