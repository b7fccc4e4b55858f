//! Raw TOF readout word format
//!
//! Every payload word is a little-endian `u32`. The top nibble is the word
//! type, but several shapes share a type and are told apart by the slot id in
//! the low nibble (DRM = 1, LTM = 2, TRM = 3..=12) or, for TDC hits, by bit 31
//! alone. Classification is therefore a set of mask/pattern tests rather than
//! a single match on the top nibble.
//!
//! Each record shape is a thin newtype over the raw word with mask-and-shift
//! accessors. Constructors OR the type pattern with the masked field values;
//! they are used by the page writer and the emulator.

use serde::{Deserialize, Serialize};

/// Raw word masks, patterns and field positions
pub mod constants {
    pub const WORD_SIZE: usize = 4;

    // Classification (mask, pattern)
    pub const TYPE_MASK: u32 = 0xF000_0000;
    pub const TYPE_SLOT_MASK: u32 = 0xF000_000F;
    pub const TRM_TRAILER_MASK: u32 = 0xF000_0003;
    pub const HIT_MASK: u32 = 0x8000_0000;

    pub const DRM_COMMON_HEADER: u32 = 0x4000_0000;
    pub const DRM_GLOBAL_HEADER: u32 = 0x4000_0001;
    pub const LTM_GLOBAL_HEADER: u32 = 0x4000_0002;
    pub const TRM_GLOBAL_HEADER: u32 = 0x4000_0000;
    pub const TRM_CHAIN_A_HEADER: u32 = 0x0000_0000;
    pub const TRM_CHAIN_B_HEADER: u32 = 0x2000_0000;
    pub const DRM_GLOBAL_TRAILER: u32 = 0x5000_0001;
    pub const LTM_GLOBAL_TRAILER: u32 = 0x5000_0002;
    pub const TRM_GLOBAL_TRAILER: u32 = 0x5000_0003;
    pub const TRM_CHAIN_A_TRAILER: u32 = 0x1000_0000;
    pub const TRM_CHAIN_B_TRAILER: u32 = 0x3000_0000;
    pub const TDC_ERROR: u32 = 0x6000_0000;
    pub const FILLER: u32 = 0x7000_0000;

    // Generic
    pub const SLOT_ID_MASK: u32 = 0xF;
    pub const FIRST_TRM_SLOT: u32 = 3;

    // DRM
    pub const DRM_ID_SHIFT: u32 = 21;
    pub const DRM_ID_MASK: u32 = 0x7F;
    pub const DRM_EVENT_WORDS_SHIFT: u32 = 4;
    pub const DRM_EVENT_WORDS_MASK: u32 = 0x1_FFFF;
    pub const SLOT_MASK_SHIFT: u32 = 4;
    pub const SLOT_MASK_MASK: u32 = 0x7FF;
    pub const FAULT_ID_SHIFT: u32 = 16;
    pub const FAULT_ID_MASK: u32 = 0x7FF;
    pub const L0_BCID_SHIFT: u32 = 4;
    pub const L0_BCID_MASK: u32 = 0xFFF;
    pub const LOCAL_EVENT_COUNTER_SHIFT: u32 = 4;
    pub const LOCAL_EVENT_COUNTER_MASK: u32 = 0xFFF;

    // TRM
    pub const TRM_EVENT_WORDS_SHIFT: u32 = 4;
    pub const TRM_EVENT_WORDS_MASK: u32 = 0x1FFF;
    pub const TRM_EVENT_NUMBER_SHIFT: u32 = 17;
    pub const TRM_EVENT_NUMBER_MASK: u32 = 0x3FF;
    pub const TRM_E_BIT_SHIFT: u32 = 27;
    pub const TRM_EVENT_CRC_SHIFT: u32 = 2;
    pub const TRM_EVENT_CRC_MASK: u32 = 0xFFF;
    pub const TRM_L_BIT_SHIFT: u32 = 27;
    pub const TRM_TRAILER_MUST_BE_THREE: u32 = 0x3;

    // TRM chain
    pub const CHAIN_BUNCH_ID_SHIFT: u32 = 4;
    pub const CHAIN_BUNCH_ID_MASK: u32 = 0xFFF;
    pub const CHAIN_EVENT_COUNTER_SHIFT: u32 = 16;
    pub const CHAIN_EVENT_COUNTER_MASK: u32 = 0xFFF;
    pub const CHAIN_STATUS_MASK: u32 = 0xF;

    // TDC hit (unpacked)
    pub const HIT_TIME_MASK: u32 = 0x1F_FFFF;
    pub const HIT_TIME_BITS: u32 = 21;
    pub const HIT_CHAN_SHIFT: u32 = 21;
    pub const HIT_CHAN_MASK: u32 = 0x7;
    pub const HIT_TDC_ID_SHIFT: u32 = 24;
    pub const HIT_TDC_ID_MASK: u32 = 0xF;
    pub const HIT_E_BIT_SHIFT: u32 = 28;
    pub const HIT_PS_BITS_SHIFT: u32 = 29;
    pub const HIT_PS_BITS_MASK: u32 = 0x3;
    pub const HIT_MBO_SHIFT: u32 = 31;

    pub const PS_LEADING: u32 = 0x1;
    pub const PS_TRAILING: u32 = 0x2;
}

use constants::*;

#[inline]
fn field(word: u32, shift: u32, mask: u32) -> u32 {
    (word >> shift) & mask
}

#[inline]
fn put(value: u32, shift: u32, mask: u32) -> u32 {
    (value & mask) << shift
}

/// Slot id carried in the low nibble of most header words
#[inline]
pub fn slot_id(word: u32) -> u32 {
    word & SLOT_ID_MASK
}

pub fn is_drm_common_header(word: u32) -> bool {
    word & TYPE_MASK == DRM_COMMON_HEADER
}

pub fn is_drm_global_header(word: u32) -> bool {
    word & TYPE_SLOT_MASK == DRM_GLOBAL_HEADER
}

pub fn is_ltm_global_header(word: u32) -> bool {
    word & TYPE_SLOT_MASK == LTM_GLOBAL_HEADER
}

/// TRM global header: global header type on a slot above the crate/LTM slots
pub fn is_trm_global_header(word: u32) -> bool {
    word & TYPE_MASK == TRM_GLOBAL_HEADER && slot_id(word) >= FIRST_TRM_SLOT
}

pub fn is_drm_global_trailer(word: u32) -> bool {
    word & TYPE_SLOT_MASK == DRM_GLOBAL_TRAILER
}

pub fn is_ltm_global_trailer(word: u32) -> bool {
    word & TYPE_SLOT_MASK == LTM_GLOBAL_TRAILER
}

pub fn is_trm_global_trailer(word: u32) -> bool {
    word & TRM_TRAILER_MASK == TRM_GLOBAL_TRAILER
}

pub fn is_tdc_error(word: u32) -> bool {
    word & TYPE_MASK == TDC_ERROR
}

pub fn is_filler(word: u32) -> bool {
    word == FILLER
}

/// Hit words are the only shape with bit 31 set
pub fn is_tdc_hit(word: u32) -> bool {
    word & HIT_MASK == HIT_MASK
}

/// One of the two readout chains of a TRM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    A,
    B,
}

impl Chain {
    pub const ALL: [Chain; 2] = [Chain::A, Chain::B];

    pub fn index(self) -> usize {
        match self {
            Chain::A => 0,
            Chain::B => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Chain> {
        match index {
            0 => Some(Chain::A),
            1 => Some(Chain::B),
            _ => None,
        }
    }

    fn header_pattern(self) -> u32 {
        match self {
            Chain::A => TRM_CHAIN_A_HEADER,
            Chain::B => TRM_CHAIN_B_HEADER,
        }
    }

    fn trailer_pattern(self) -> u32 {
        match self {
            Chain::A => TRM_CHAIN_A_TRAILER,
            Chain::B => TRM_CHAIN_B_TRAILER,
        }
    }

    /// Chain header of this chain belonging to the TRM in `slot`
    pub fn is_header(self, word: u32, slot: u32) -> bool {
        word & TYPE_MASK == self.header_pattern() && slot_id(word) == slot
    }

    pub fn is_trailer(self, word: u32) -> bool {
        word & TYPE_MASK == self.trailer_pattern()
    }
}

impl std::fmt::Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Chain::A => write!(f, "A"),
            Chain::B => write!(f, "B"),
        }
    }
}

/// A record shape that can be viewed over a raw word
pub trait RawWord: Copy {
    fn from_raw(word: u32) -> Self;
    fn raw(self) -> u32;
}

macro_rules! raw_word {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(pub u32);

        impl RawWord for $name {
            #[inline]
            fn from_raw(word: u32) -> Self {
                Self(word)
            }

            #[inline]
            fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

raw_word!(
    /// DRM global header (slot 1)
    DrmGlobalHeader
);

impl DrmGlobalHeader {
    pub fn new(drm_id: u32, event_words: u32) -> Self {
        Self(
            DRM_GLOBAL_HEADER
                | put(event_words, DRM_EVENT_WORDS_SHIFT, DRM_EVENT_WORDS_MASK)
                | put(drm_id, DRM_ID_SHIFT, DRM_ID_MASK),
        )
    }

    pub fn drm_id(self) -> u32 {
        field(self.0, DRM_ID_SHIFT, DRM_ID_MASK)
    }

    pub fn event_words(self) -> u32 {
        field(self.0, DRM_EVENT_WORDS_SHIFT, DRM_EVENT_WORDS_MASK)
    }
}

raw_word!(
    /// DRM status header 1: participating slot mask
    DrmStatusHeader1
);

impl DrmStatusHeader1 {
    pub fn new(participating_mask: u32) -> Self {
        Self(DRM_COMMON_HEADER | 0x1 | put(participating_mask, SLOT_MASK_SHIFT, SLOT_MASK_MASK))
    }

    pub fn participating_mask(self) -> u32 {
        field(self.0, SLOT_MASK_SHIFT, SLOT_MASK_MASK)
    }
}

raw_word!(
    /// DRM status header 2: slot enable mask and fault id
    DrmStatusHeader2
);

impl DrmStatusHeader2 {
    pub fn new(enable_mask: u32) -> Self {
        Self(DRM_COMMON_HEADER | 0x1 | put(enable_mask, SLOT_MASK_SHIFT, SLOT_MASK_MASK))
    }

    pub fn enable_mask(self) -> u32 {
        field(self.0, SLOT_MASK_SHIFT, SLOT_MASK_MASK)
    }

    pub fn fault_id(self) -> u32 {
        field(self.0, FAULT_ID_SHIFT, FAULT_ID_MASK)
    }
}

raw_word!(
    /// DRM status header 3: L0 bunch id
    DrmStatusHeader3
);

impl DrmStatusHeader3 {
    pub fn new(l0_bcid: u32) -> Self {
        Self(DRM_COMMON_HEADER | 0x1 | put(l0_bcid, L0_BCID_SHIFT, L0_BCID_MASK))
    }

    pub fn l0_bcid(self) -> u32 {
        field(self.0, L0_BCID_SHIFT, L0_BCID_MASK)
    }
}

raw_word!(
    /// DRM global trailer: local event counter
    DrmGlobalTrailer
);

impl DrmGlobalTrailer {
    pub fn new(local_event_counter: u32) -> Self {
        Self(
            DRM_GLOBAL_TRAILER
                | put(
                    local_event_counter,
                    LOCAL_EVENT_COUNTER_SHIFT,
                    LOCAL_EVENT_COUNTER_MASK,
                ),
        )
    }

    pub fn local_event_counter(self) -> u32 {
        field(self.0, LOCAL_EVENT_COUNTER_SHIFT, LOCAL_EVENT_COUNTER_MASK)
    }
}

raw_word!(TrmGlobalHeader);

impl TrmGlobalHeader {
    pub fn new(slot: u32, event_number: u32, event_words: u32) -> Self {
        Self(
            TRM_GLOBAL_HEADER
                | (slot & SLOT_ID_MASK)
                | put(event_words, TRM_EVENT_WORDS_SHIFT, TRM_EVENT_WORDS_MASK)
                | put(event_number, TRM_EVENT_NUMBER_SHIFT, TRM_EVENT_NUMBER_MASK),
        )
    }

    pub fn slot_id(self) -> u32 {
        slot_id(self.0)
    }

    pub fn event_words(self) -> u32 {
        field(self.0, TRM_EVENT_WORDS_SHIFT, TRM_EVENT_WORDS_MASK)
    }

    pub fn event_number(self) -> u32 {
        field(self.0, TRM_EVENT_NUMBER_SHIFT, TRM_EVENT_NUMBER_MASK)
    }

    pub fn e_bit(self) -> bool {
        field(self.0, TRM_E_BIT_SHIFT, 0x1) != 0
    }
}

raw_word!(TrmGlobalTrailer);

impl TrmGlobalTrailer {
    pub fn new(event_crc: u32) -> Self {
        Self(
            TRM_GLOBAL_TRAILER
                | TRM_TRAILER_MUST_BE_THREE
                | put(event_crc, TRM_EVENT_CRC_SHIFT, TRM_EVENT_CRC_MASK),
        )
    }

    pub fn event_crc(self) -> u32 {
        field(self.0, TRM_EVENT_CRC_SHIFT, TRM_EVENT_CRC_MASK)
    }

    pub fn l_bit(self) -> bool {
        field(self.0, TRM_L_BIT_SHIFT, 0x1) != 0
    }
}

raw_word!(TrmChainHeader);

impl TrmChainHeader {
    pub fn new(chain: Chain, slot: u32, bunch_id: u32) -> Self {
        Self(
            chain.header_pattern()
                | (slot & SLOT_ID_MASK)
                | put(bunch_id, CHAIN_BUNCH_ID_SHIFT, CHAIN_BUNCH_ID_MASK),
        )
    }

    pub fn slot_id(self) -> u32 {
        slot_id(self.0)
    }

    pub fn bunch_id(self) -> u32 {
        field(self.0, CHAIN_BUNCH_ID_SHIFT, CHAIN_BUNCH_ID_MASK)
    }
}

raw_word!(TrmChainTrailer);

impl TrmChainTrailer {
    pub fn new(chain: Chain, event_counter: u32, status: u32) -> Self {
        Self(
            chain.trailer_pattern()
                | (status & CHAIN_STATUS_MASK)
                | put(
                    event_counter,
                    CHAIN_EVENT_COUNTER_SHIFT,
                    CHAIN_EVENT_COUNTER_MASK,
                ),
        )
    }

    pub fn event_counter(self) -> u32 {
        field(self.0, CHAIN_EVENT_COUNTER_SHIFT, CHAIN_EVENT_COUNTER_MASK)
    }

    pub fn status(self) -> u32 {
        self.0 & CHAIN_STATUS_MASK
    }
}

/// Leading/trailing marker carried in the PS bits of a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMarker {
    Leading,
    Trailing,
    Other(u8),
}

impl EdgeMarker {
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            PS_LEADING => EdgeMarker::Leading,
            PS_TRAILING => EdgeMarker::Trailing,
            other => EdgeMarker::Other(other as u8),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            EdgeMarker::Leading => PS_LEADING,
            EdgeMarker::Trailing => PS_TRAILING,
            EdgeMarker::Other(bits) => bits as u32 & HIT_PS_BITS_MASK,
        }
    }
}

/// Unpacked TDC hit as it arrives from a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnpackedHit(pub u32);

impl RawWord for UnpackedHit {
    #[inline]
    fn from_raw(word: u32) -> Self {
        Self(word)
    }

    #[inline]
    fn raw(self) -> u32 {
        self.0
    }
}

impl UnpackedHit {
    pub fn new(time: u32, channel: u32, tdc_id: u32, e_bit: bool, marker: EdgeMarker) -> Self {
        Self(
            (1 << HIT_MBO_SHIFT)
                | (time & HIT_TIME_MASK)
                | put(channel, HIT_CHAN_SHIFT, HIT_CHAN_MASK)
                | put(tdc_id, HIT_TDC_ID_SHIFT, HIT_TDC_ID_MASK)
                | put(e_bit as u32, HIT_E_BIT_SHIFT, 0x1)
                | put(marker.bits(), HIT_PS_BITS_SHIFT, HIT_PS_BITS_MASK),
        )
    }

    pub fn leading(time: u32, channel: u32, tdc_id: u32) -> Self {
        Self::new(time, channel, tdc_id, false, EdgeMarker::Leading)
    }

    pub fn trailing(time: u32, channel: u32, tdc_id: u32) -> Self {
        Self::new(time, channel, tdc_id, false, EdgeMarker::Trailing)
    }

    pub fn time(self) -> u32 {
        self.0 & HIT_TIME_MASK
    }

    pub fn channel(self) -> u32 {
        field(self.0, HIT_CHAN_SHIFT, HIT_CHAN_MASK)
    }

    pub fn tdc_id(self) -> u32 {
        field(self.0, HIT_TDC_ID_SHIFT, HIT_TDC_ID_MASK)
    }

    pub fn e_bit(self) -> bool {
        field(self.0, HIT_E_BIT_SHIFT, 0x1) != 0
    }

    pub fn ps_bits(self) -> u32 {
        field(self.0, HIT_PS_BITS_SHIFT, HIT_PS_BITS_MASK)
    }

    pub fn marker(self) -> EdgeMarker {
        EdgeMarker::from_bits(self.ps_bits())
    }

    pub fn must_be_one(self) -> bool {
        field(self.0, HIT_MBO_SHIFT, 0x1) != 0
    }
}

/// Human-readable one-line description of a raw word, for dumps
pub fn describe(word: u32) -> String {
    if is_tdc_hit(word) {
        let hit = UnpackedHit(word);
        return format!(
            "TDC hit (time={}, chan={}, tdc={}, ebit={}, ps={})",
            hit.time(),
            hit.channel(),
            hit.tdc_id(),
            hit.e_bit() as u8,
            hit.ps_bits()
        );
    }
    if is_drm_global_header(word) {
        return format!("DRM global header (drm_id={})", DrmGlobalHeader(word).drm_id());
    }
    if is_ltm_global_header(word) {
        return "LTM global header".to_string();
    }
    if is_trm_global_header(word) {
        let h = TrmGlobalHeader(word);
        return format!(
            "TRM global header (slot={}, event_words={}, event_number={})",
            h.slot_id(),
            h.event_words(),
            h.event_number()
        );
    }
    if is_drm_global_trailer(word) {
        return format!(
            "DRM global trailer (local_event_counter={})",
            DrmGlobalTrailer(word).local_event_counter()
        );
    }
    if is_ltm_global_trailer(word) {
        return "LTM global trailer".to_string();
    }
    if is_trm_global_trailer(word) {
        return format!("TRM global trailer (crc={})", TrmGlobalTrailer(word).event_crc());
    }
    for chain in Chain::ALL {
        if word & TYPE_MASK == chain.header_pattern() {
            let h = TrmChainHeader(word);
            return format!(
                "TRM chain-{} header (slot={}, bunch_id={})",
                chain,
                h.slot_id(),
                h.bunch_id()
            );
        }
        if chain.is_trailer(word) {
            let t = TrmChainTrailer(word);
            return format!(
                "TRM chain-{} trailer (event_counter={}, status={})",
                chain,
                t.event_counter(),
                t.status()
            );
        }
    }
    if is_tdc_error(word) {
        return "TDC error".to_string();
    }
    if is_filler(word) {
        return "Filler".to_string();
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_drm_words() {
        assert!(is_drm_common_header(0x4000_0000));
        assert!(is_drm_global_header(DrmGlobalHeader::new(5, 10).raw()));
        assert!(!is_drm_global_header(0x4000_0002));
        assert!(is_ltm_global_header(0x4000_0002));
        assert!(is_drm_global_trailer(DrmGlobalTrailer::new(7).raw()));
        assert!(is_ltm_global_trailer(0x5000_0002));
    }

    #[test]
    fn test_trm_header_requires_slot_above_two() {
        assert!(!is_trm_global_header(0x4000_0001));
        assert!(!is_trm_global_header(0x4000_0002));
        assert!(is_trm_global_header(0x4000_0003));
        assert!(is_trm_global_header(TrmGlobalHeader::new(12, 0, 0).raw()));
    }

    #[test]
    fn test_trm_trailer_pattern() {
        assert!(is_trm_global_trailer(TrmGlobalTrailer::new(0xABC).raw()));
        // DRM trailer has low bits 01, not 11
        assert!(!is_trm_global_trailer(0x5000_0001));
    }

    #[test]
    fn test_chain_header_matches_slot() {
        let word = TrmChainHeader::new(Chain::B, 4, 100).raw();
        assert!(Chain::B.is_header(word, 4));
        assert!(!Chain::B.is_header(word, 5));
        assert!(!Chain::A.is_header(word, 4));
    }

    #[test]
    fn test_hit_is_bit_31_only() {
        assert!(is_tdc_hit(0x8000_0000));
        assert!(is_tdc_hit(0xF000_0000));
        assert!(!is_tdc_hit(0x7000_0000));
        assert!(is_filler(0x7000_0000));
        assert!(!is_filler(0x7000_0001));
        assert!(is_tdc_error(0x6000_1234));
    }

    #[test]
    fn test_unpacked_hit_fields_at_max() {
        let hit = UnpackedHit::new(HIT_TIME_MASK, 7, 15, true, EdgeMarker::Trailing);
        assert_eq!(hit.time(), 0x1F_FFFF);
        assert_eq!(hit.channel(), 7);
        assert_eq!(hit.tdc_id(), 15);
        assert!(hit.e_bit());
        assert_eq!(hit.marker(), EdgeMarker::Trailing);
        assert!(hit.must_be_one());
    }

    #[test]
    fn test_unpacked_hit_fields_do_not_bleed() {
        let hit = UnpackedHit::new(0, 5, 0, false, EdgeMarker::Leading);
        assert_eq!(hit.raw(), 0x8000_0000 | (5 << 21) | (1 << 29));
        assert_eq!(hit.time(), 0);
        assert_eq!(hit.tdc_id(), 0);
        assert!(!hit.e_bit());
    }

    #[test]
    fn test_drm_fields_roundtrip() {
        assert_eq!(DrmGlobalHeader::new(0x7F, 0x1_FFFF).drm_id(), 0x7F);
        assert_eq!(DrmGlobalHeader::new(0x7F, 0x1_FFFF).event_words(), 0x1_FFFF);
        assert_eq!(DrmStatusHeader1::new(0x7FF).participating_mask(), 0x7FF);
        assert_eq!(DrmStatusHeader2::new(0x3FE).enable_mask(), 0x3FE);
        assert_eq!(DrmStatusHeader3::new(0xFFF).l0_bcid(), 0xFFF);
        assert_eq!(DrmGlobalTrailer::new(0xFFF).local_event_counter(), 0xFFF);
    }

    #[test]
    fn test_trm_fields_roundtrip() {
        let h = TrmGlobalHeader::new(9, 0x3FF, 0x1FFF);
        assert_eq!(h.slot_id(), 9);
        assert_eq!(h.event_number(), 0x3FF);
        assert_eq!(h.event_words(), 0x1FFF);
        assert!(!h.e_bit());

        let ch = TrmChainHeader::new(Chain::A, 3, 0xFFF);
        assert_eq!(ch.slot_id(), 3);
        assert_eq!(ch.bunch_id(), 0xFFF);

        let ct = TrmChainTrailer::new(Chain::A, 0xFFF, 0xF);
        assert_eq!(ct.event_counter(), 0xFFF);
        assert_eq!(ct.status(), 0xF);
        assert!(Chain::A.is_trailer(ct.raw()));
        assert!(!Chain::B.is_trailer(ct.raw()));
    }

    #[test]
    fn test_describe_known_and_unknown() {
        assert!(describe(UnpackedHit::leading(100, 2, 3).raw()).starts_with("TDC hit"));
        assert_eq!(describe(0x7000_0000), "Filler");
        assert!(describe(DrmGlobalTrailer::new(3).raw()).contains("local_event_counter=3"));
    }
}
