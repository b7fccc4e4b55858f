//! Compressed decoder
//!
//! Reads back what the encoder writes, one event at a time, restoring
//! absolute hit times from the frame id.

use serde::Serialize;
use tracing::trace;

use super::format::{tag, CrateHeader, CrateTrailer, FrameHeader, PackedHit};
use super::DecodeError;
use crate::raw::format::{constants::FIRST_TRM_SLOT, Chain};
use crate::raw::spider::FRAME_SHIFT;
use crate::raw::summary::N_TRM;

/// One hit read from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressedHit {
    pub chain: Chain,
    pub tdc_id: u8,
    pub channel: u8,
    /// Absolute time: frame id << 13 | time in frame
    pub time: u32,
    pub tot: u32,
}

/// Hits of one (TRM, frame) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressedFrame {
    pub slot_id: u8,
    pub frame_id: u8,
    pub delta_bc: u8,
    pub hits: Vec<CompressedHit>,
}

/// One decoded compressed event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressedEvent {
    /// Byte offset of the crate header
    pub offset: usize,
    pub drm_id: u32,
    pub event_counter: u32,
    pub bunch_id: u32,
    pub frames: Vec<CompressedFrame>,
    /// Raw trailer word
    pub trailer: u32,
}

impl CompressedEvent {
    pub fn n_hits(&self) -> usize {
        self.frames.iter().map(|f| f.hits.len()).sum()
    }

    pub fn trailer(&self) -> CrateTrailer {
        CrateTrailer(self.trailer)
    }

    pub fn has_fault(&self) -> bool {
        self.trailer().any_fault()
    }
}

/// Sequential reader over a compressed byte stream
#[derive(Debug, Clone)]
pub struct CompressedDecoder<'a> {
    data: &'a [u8],
    offset: usize,
    dump_enabled: bool,
}

impl<'a> CompressedDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            dump_enabled: false,
        }
    }

    pub fn set_dump_enabled(&mut self, enabled: bool) {
        self.dump_enabled = enabled;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True when every byte has been consumed
    pub fn is_finished(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn available(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        let available = self.available();
        if available < needed {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn next_word(&mut self, what: &str) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        let bytes = &self.data[self.offset..self.offset + 4];
        let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if self.dump_enabled {
            trace!("{:6} {:08x} {}", self.offset, word, what);
        }
        self.offset += 4;
        Ok(word)
    }

    /// Decode the next event; `Ok(None)` at a clean end of input
    pub fn next_event(&mut self) -> Result<Option<CompressedEvent>, DecodeError> {
        if self.is_finished() {
            return Ok(None);
        }

        let offset = self.offset;
        let word = self.next_word("crate header")?;
        if !tag(word) {
            return Err(DecodeError::InvalidCrateHeader { word, offset });
        }
        let header = CrateHeader(word);

        let mut frames = Vec::new();
        loop {
            let word_offset = self.offset;
            let word = self.next_word("")?;
            if tag(word) {
                return Ok(Some(CompressedEvent {
                    offset,
                    drm_id: header.drm_id(),
                    event_counter: header.event_counter(),
                    bunch_id: header.bunch_id(),
                    frames,
                    trailer: word,
                }));
            }

            let frame = FrameHeader(word);
            let slot = frame.trm_id();
            let count = frame.hit_count() as usize;
            if count == 0 || slot < FIRST_TRM_SLOT || slot >= FIRST_TRM_SLOT + N_TRM as u32 {
                return Err(DecodeError::UnexpectedFrameHeader {
                    word,
                    offset: word_offset,
                });
            }
            self.ensure(count * 4)?;

            let base = frame.frame_id() << FRAME_SHIFT;
            let mut hits = Vec::with_capacity(count);
            for _ in 0..count {
                let hit = PackedHit(self.next_word("hit")?);
                hits.push(CompressedHit {
                    chain: hit.chain(),
                    tdc_id: hit.tdc_id() as u8,
                    channel: hit.channel() as u8,
                    time: base | hit.time(),
                    tot: hit.tot(),
                });
            }
            frames.push(CompressedFrame {
                slot_id: slot as u8,
                frame_id: frame.frame_id() as u8,
                delta_bc: frame.delta_bc() as u8,
                hits,
            });
        }
    }
}

impl Iterator for CompressedDecoder<'_> {
    type Item = Result<CompressedEvent, DecodeError>;

    /// Stops after the first error
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}
