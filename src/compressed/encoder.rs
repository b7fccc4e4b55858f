//! Compressed encoder
//!
//! Packs a checked [`Summary`] and its paired hits into the compressed
//! format. Events are appended to a fixed-size output buffer that the caller
//! flushes; an event is either written completely or not at all.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::format::{
    max_value, CrateHeader, CrateTrailer, FrameHeader, PackedHit, HIT_COUNT_BITS, TIME_BITS,
    TOT_BITS,
};
use super::EncodeError;
use crate::raw::format::constants::WORD_SIZE;
use crate::raw::spider::PairedHit;
use crate::raw::summary::{trm_slot_id, Summary, N_TRM};

/// What to do with a value wider than its packed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Fail the event with `FieldOverflow`
    #[default]
    Reject,
    /// Clamp to the field maximum and warn
    Saturate,
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Output buffer size in bytes
    pub buffer_size: usize,
    pub overflow_policy: OverflowPolicy,
    /// Trace one line per encoded word
    pub dump_enabled: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            buffer_size: super::DEFAULT_BUFFER_SIZE,
            overflow_policy: OverflowPolicy::Reject,
            dump_enabled: false,
        }
    }
}

/// Integrated encoder statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EncoderStats {
    pub events: u64,
    pub frames: u64,
    pub hits: u64,
    pub bytes: u64,
    pub saturated_fields: u64,
    pub rejected_events: u64,
}

/// Compressed encoder with its output buffer
#[derive(Debug)]
pub struct Encoder {
    config: EncoderConfig,
    buffer: Vec<u8>,
    /// (TRM index, frame id) -> packed hits, in insertion order
    frames: BTreeMap<(usize, u32), Vec<u32>>,
    words: Vec<u32>,
    stats: EncoderStats,
}

impl Encoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.buffer_size),
            config,
            frames: BTreeMap::new(),
            words: Vec::with_capacity(256),
            stats: EncoderStats::default(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(EncoderConfig::default())
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn stats(&self) -> &EncoderStats {
        &self.stats
    }

    /// Encoded bytes not yet flushed
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes left in the output buffer
    pub fn remaining(&self) -> usize {
        self.config.buffer_size.saturating_sub(self.buffer.len())
    }

    /// Drop the buffered output
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Write the buffered output to `writer` and reset the buffer
    pub fn flush_to<W: Write>(&mut self, writer: &mut W) -> std::io::Result<usize> {
        let n = self.buffer.len();
        writer.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(n)
    }

    fn check_field(
        &mut self,
        field: &'static str,
        value: u32,
        bits: u32,
    ) -> Result<u32, EncodeError> {
        let max = max_value(bits);
        if value <= max {
            return Ok(value);
        }
        match self.config.overflow_policy {
            OverflowPolicy::Reject => Err(EncodeError::FieldOverflow { field, value, bits }),
            OverflowPolicy::Saturate => {
                warn!(field, value, max, "Field overflow, saturating");
                self.stats.saturated_fields += 1;
                Ok(max)
            }
        }
    }

    /// Encode one event and append it to the output buffer
    ///
    /// Returns the number of bytes appended. On error nothing is appended.
    pub fn encode(&mut self, summary: &Summary, hits: &[PairedHit]) -> Result<usize, EncodeError> {
        let result = self.build(summary, hits);
        if result.is_err() {
            self.stats.rejected_events += 1;
        }
        result?;

        let needed = self.words.len() * WORD_SIZE;
        let available = self.remaining();
        if needed > available {
            return Err(EncodeError::BufferFull { needed, available });
        }

        for word in &self.words {
            self.buffer.extend_from_slice(&word.to_le_bytes());
        }
        self.stats.events += 1;
        self.stats.bytes += needed as u64;

        debug!(
            bytes = needed,
            frames = self.frames.len(),
            hits = hits.len(),
            fault = summary.fault_flags.any(),
            "Encoded event"
        );
        Ok(needed)
    }

    /// Build the event's words in the scratch vector
    fn build(&mut self, summary: &Summary, hits: &[PairedHit]) -> Result<(), EncodeError> {
        self.words.clear();
        self.frames.clear();

        let header = CrateHeader::new(
            summary.drm_global_header().drm_id(),
            summary.drm_global_trailer().local_event_counter(),
            summary.drm_status_header3().l0_bcid(),
        );
        self.push(header.0, "crate header");

        for hit in hits {
            let tot = self.check_field("tot", hit.width, TOT_BITS)?;
            let packed = PackedHit::new(
                hit.chain,
                hit.tdc_id as u32,
                hit.channel as u32,
                hit.time & max_value(TIME_BITS),
                tot,
            );
            self.frames
                .entry((hit.trm as usize, hit.frame()))
                .or_default()
                .push(packed.0);
        }

        let frames = std::mem::take(&mut self.frames);
        for (&(itrm, frame_id), packed) in &frames {
            if packed.is_empty() || itrm >= N_TRM {
                continue;
            }
            let count = self.check_field("hit count", packed.len() as u32, HIT_COUNT_BITS)?;
            let frame = FrameHeader::new(trm_slot_id(itrm), frame_id, count, 0);
            self.push(frame.0, "frame header");
            for &word in packed.iter().take(count as usize) {
                self.push(word, "hit");
            }
            self.stats.frames += 1;
            self.stats.hits += count as u64;
        }
        self.frames = frames;

        let flags = summary.fault_flags;
        let codes: [u32; N_TRM] = std::array::from_fn(|itrm| flags.trm_code(itrm));
        let trailer = CrateTrailer::new(&codes, flags.crate_fault());
        self.push(trailer.0, "crate trailer");
        Ok(())
    }

    fn push(&mut self, word: u32, what: &str) {
        if self.config.dump_enabled {
            trace!("{:08x} {}", word, what);
        }
        self.words.push(word);
    }
}
