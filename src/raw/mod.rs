//! Raw TOF readout format
//!
//! Decodes CRU pages (RDH + carrier-embedded DRM/TRM payload) into a per-event
//! [`Summary`], pairs leading/trailing hits and checks the decoded structure
//! against the readout protocol.

pub mod checker;
pub mod cursor;
pub mod decoder;
pub mod format;
pub mod rdh;
pub mod spider;
pub mod summary;
pub mod writer;

pub use checker::{Checker, CheckerCounters};
pub use cursor::WordCursor;
pub use decoder::{EventStats, PageReader, RawDecoder, RawDecoderConfig};
pub use format::{Chain, EdgeMarker, UnpackedHit};
pub use rdh::{read_page_header, PageHeader, MAX_PAGE_SIZE, RDH_SIZE};
pub use spider::{pair_hits, PairedHit, FRAME_SHIFT};
pub use summary::{FaultFlags, Summary, N_TRM};
pub use writer::RawPageWriter;

use thiserror::Error;

/// Default CRU page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Raw decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes left in the buffer than the next record needs
    #[error("Truncated input: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The page's declared memory size was reached
    #[error("Page memory exhausted at offset {offset} (memory size {memory_size})")]
    MemoryExhausted { offset: usize, memory_size: usize },

    /// First word of an event is not a DRM common header
    #[error("Invalid DRM common header 0x{word:08x} at offset {offset}")]
    InvalidCommonHeader { word: u32, offset: usize },

    /// Third word of an event is not a DRM global header
    #[error("Invalid DRM global header 0x{word:08x} at offset {offset}")]
    InvalidGlobalHeader { word: u32, offset: usize },
}

impl DecodeError {
    /// Running out of input rather than reading corrupt input
    pub fn is_end_of_input(&self) -> bool {
        matches!(
            self,
            DecodeError::Truncated { .. } | DecodeError::MemoryExhausted { .. }
        )
    }
}

/// Split a raw file image into fixed-size CRU pages; a trailing partial page is dropped
pub fn pages(data: &[u8], page_size: usize) -> std::slice::ChunksExact<'_, u8> {
    data.chunks_exact(page_size.max(RDH_SIZE))
}
