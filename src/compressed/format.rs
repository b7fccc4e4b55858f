//! Compressed word format
//!
//! ```text
//! crate header   | 1 | drm id [30:24] | event counter [23:12] | bunch id [11:0] |
//! frame header   | 0 | delta bc [30:28] | trm id [27:24] | frame id [23:16] | hits [15:0] |
//! packed hit     | chain [31] | tdc [30:27] | chan [26:24] | time in frame [23:11] | tot [10:0] |
//! crate trailer  | 1 | crate fault [30] | trm 9 .. trm 0 fault codes, 3 bits each [29:0] |
//! ```
//!
//! Packed hits carry no tag: the preceding frame header's hit count says how
//! many follow. Crate header and trailer share tag 1 and are told apart by
//! position.

use crate::raw::format::Chain;
use crate::raw::spider::FRAME_SHIFT;

pub const TAG_SHIFT: u32 = 31;

pub const BUNCH_ID_BITS: u32 = 12;
pub const EVENT_COUNTER_BITS: u32 = 12;
pub const DRM_ID_BITS: u32 = 7;

pub const HIT_COUNT_BITS: u32 = 16;
pub const FRAME_ID_BITS: u32 = 8;
pub const TRM_ID_BITS: u32 = 4;
pub const DELTA_BC_BITS: u32 = 3;

/// Time-over-threshold width of a packed hit
pub const TOT_BITS: u32 = 11;
pub const TIME_BITS: u32 = FRAME_SHIFT;
pub const CHANNEL_BITS: u32 = 3;
pub const TDC_ID_BITS: u32 = 4;

pub const TRM_FAULT_BITS: u32 = 3;
pub const CRATE_FAULT_SHIFT: u32 = 30;

/// Largest value representable in `bits` bits
#[inline]
pub const fn max_value(bits: u32) -> u32 {
    (1 << bits) - 1
}

#[inline]
fn field(word: u32, shift: u32, bits: u32) -> u32 {
    (word >> shift) & max_value(bits)
}

#[inline]
fn put(value: u32, shift: u32, bits: u32) -> u32 {
    (value & max_value(bits)) << shift
}

/// Tag bit: 1 for crate header/trailer, 0 for frame header
#[inline]
pub fn tag(word: u32) -> bool {
    word >> TAG_SHIFT != 0
}

/// Crate header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrateHeader(pub u32);

impl CrateHeader {
    pub fn new(drm_id: u32, event_counter: u32, bunch_id: u32) -> Self {
        Self(
            1 << TAG_SHIFT
                | put(bunch_id, 0, BUNCH_ID_BITS)
                | put(event_counter, BUNCH_ID_BITS, EVENT_COUNTER_BITS)
                | put(drm_id, BUNCH_ID_BITS + EVENT_COUNTER_BITS, DRM_ID_BITS),
        )
    }

    pub fn bunch_id(self) -> u32 {
        field(self.0, 0, BUNCH_ID_BITS)
    }

    pub fn event_counter(self) -> u32 {
        field(self.0, BUNCH_ID_BITS, EVENT_COUNTER_BITS)
    }

    pub fn drm_id(self) -> u32 {
        field(self.0, BUNCH_ID_BITS + EVENT_COUNTER_BITS, DRM_ID_BITS)
    }
}

/// Frame header: opens `hit_count` packed hits of one TRM and time frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader(pub u32);

impl FrameHeader {
    const FRAME_ID_SHIFT: u32 = HIT_COUNT_BITS;
    const TRM_ID_SHIFT: u32 = Self::FRAME_ID_SHIFT + FRAME_ID_BITS;
    const DELTA_BC_SHIFT: u32 = Self::TRM_ID_SHIFT + TRM_ID_BITS;

    pub fn new(trm_id: u32, frame_id: u32, hit_count: u32, delta_bc: u32) -> Self {
        Self(
            put(hit_count, 0, HIT_COUNT_BITS)
                | put(frame_id, Self::FRAME_ID_SHIFT, FRAME_ID_BITS)
                | put(trm_id, Self::TRM_ID_SHIFT, TRM_ID_BITS)
                | put(delta_bc, Self::DELTA_BC_SHIFT, DELTA_BC_BITS),
        )
    }

    pub fn hit_count(self) -> u32 {
        field(self.0, 0, HIT_COUNT_BITS)
    }

    pub fn frame_id(self) -> u32 {
        field(self.0, Self::FRAME_ID_SHIFT, FRAME_ID_BITS)
    }

    /// Slot id of the TRM (3..=12)
    pub fn trm_id(self) -> u32 {
        field(self.0, Self::TRM_ID_SHIFT, TRM_ID_BITS)
    }

    pub fn delta_bc(self) -> u32 {
        field(self.0, Self::DELTA_BC_SHIFT, DELTA_BC_BITS)
    }
}

/// One paired hit inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedHit(pub u32);

impl PackedHit {
    const TIME_SHIFT: u32 = TOT_BITS;
    const CHANNEL_SHIFT: u32 = Self::TIME_SHIFT + TIME_BITS;
    const TDC_ID_SHIFT: u32 = Self::CHANNEL_SHIFT + CHANNEL_BITS;
    const CHAIN_SHIFT: u32 = Self::TDC_ID_SHIFT + TDC_ID_BITS;

    pub fn new(chain: Chain, tdc_id: u32, channel: u32, time: u32, tot: u32) -> Self {
        Self(
            put(tot, 0, TOT_BITS)
                | put(time, Self::TIME_SHIFT, TIME_BITS)
                | put(channel, Self::CHANNEL_SHIFT, CHANNEL_BITS)
                | put(tdc_id, Self::TDC_ID_SHIFT, TDC_ID_BITS)
                | put(chain.index() as u32, Self::CHAIN_SHIFT, 1),
        )
    }

    pub fn tot(self) -> u32 {
        field(self.0, 0, TOT_BITS)
    }

    /// Time within the frame (low 13 bits of the absolute time)
    pub fn time(self) -> u32 {
        field(self.0, Self::TIME_SHIFT, TIME_BITS)
    }

    pub fn channel(self) -> u32 {
        field(self.0, Self::CHANNEL_SHIFT, CHANNEL_BITS)
    }

    pub fn tdc_id(self) -> u32 {
        field(self.0, Self::TDC_ID_SHIFT, TDC_ID_BITS)
    }

    pub fn chain(self) -> Chain {
        if field(self.0, Self::CHAIN_SHIFT, 1) == 0 {
            Chain::A
        } else {
            Chain::B
        }
    }
}

/// Crate trailer carrying the checker's fault codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrateTrailer(pub u32);

impl CrateTrailer {
    /// Trailer from per-module 3-bit codes (index 0 = slot 3) and the crate fault bit
    pub fn new(trm_codes: &[u32], crate_fault: bool) -> Self {
        let mut word = 1 << TAG_SHIFT | (crate_fault as u32) << CRATE_FAULT_SHIFT;
        for (itrm, code) in trm_codes.iter().enumerate().take(10) {
            word |= put(*code, itrm as u32 * TRM_FAULT_BITS, TRM_FAULT_BITS);
        }
        Self(word)
    }

    /// 3-bit fault code of TRM index `itrm`: bit 0 module, bit 1 chain A, bit 2 chain B
    pub fn trm_fault(self, itrm: usize) -> u32 {
        field(self.0, itrm as u32 * TRM_FAULT_BITS, TRM_FAULT_BITS)
    }

    pub fn crate_fault(self) -> bool {
        self.0 >> CRATE_FAULT_SHIFT & 1 != 0
    }

    /// True if any fault bit is set
    pub fn any_fault(self) -> bool {
        self.0 & !(1 << TAG_SHIFT) != 0
    }
}
