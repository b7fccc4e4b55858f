//! Per-event decode summary
//!
//! One `Summary` is filled by a decode pass and read by the checker, the hit
//! pairer and the encoder. Header and trailer slots hold the raw word, with 0
//! meaning "not seen" (0 is never a legal header/trailer value).

use serde::Serialize;

use super::format::{
    Chain, DrmGlobalHeader, DrmGlobalTrailer, DrmStatusHeader1, DrmStatusHeader2,
    DrmStatusHeader3, TrmChainHeader, TrmChainTrailer, TrmGlobalHeader, TrmGlobalTrailer,
    UnpackedHit,
};
use super::rdh::PageHeader;

/// Number of TRM slots in a crate (slot ids 3..=12)
pub const N_TRM: usize = 10;
/// Chains per TRM
pub const N_CHAIN: usize = 2;
/// TDCs per chain
pub const N_TDC: usize = 15;
/// Hit capacity of one (TRM, chain, TDC) bucket
pub const MAX_HITS_PER_TDC: usize = 256;

/// Slot id of TRM index `itrm`
#[inline]
pub fn trm_slot_id(itrm: usize) -> u32 {
    itrm as u32 + super::format::constants::FIRST_TRM_SLOT
}

/// Checker fault bits
///
/// Bit 0 is the crate. Module `i` owns three bits starting at `1 + 3 * i`:
/// module, chain A, chain B. The layout mirrors the compressed trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FaultFlags(pub u32);

impl FaultFlags {
    pub const CRATE: u32 = 0x1;

    fn trm_bit(itrm: usize) -> u32 {
        1 << (1 + itrm * 3)
    }

    fn chain_bit(itrm: usize, chain: Chain) -> u32 {
        Self::trm_bit(itrm) << (chain.index() + 1)
    }

    pub fn set_crate(&mut self) {
        self.0 |= Self::CRATE;
    }

    pub fn set_trm(&mut self, itrm: usize) {
        self.0 |= Self::trm_bit(itrm);
    }

    pub fn set_chain(&mut self, itrm: usize, chain: Chain) {
        self.0 |= Self::chain_bit(itrm, chain);
    }

    pub fn crate_fault(&self) -> bool {
        self.0 & Self::CRATE != 0
    }

    pub fn trm_fault(&self, itrm: usize) -> bool {
        self.0 & Self::trm_bit(itrm) != 0
    }

    pub fn chain_fault(&self, itrm: usize, chain: Chain) -> bool {
        self.0 & Self::chain_bit(itrm, chain) != 0
    }

    /// 3-bit fault code of module `itrm`: bit 0 module, bit 1 chain A, bit 2 chain B
    pub fn trm_code(&self, itrm: usize) -> u32 {
        (self.0 >> (1 + itrm * 3)) & 0x7
    }

    pub fn any(&self) -> bool {
        self.0 != 0
    }
}

/// Headers, trailers and hits of one chain
#[derive(Debug, Clone, Serialize)]
pub struct ChainSummary {
    pub header: u32,
    pub trailer: u32,
    /// A TDC error word was seen in this chain
    pub tdc_error: bool,
    /// Hits per TDC, in arrival order
    pub hits: [Vec<UnpackedHit>; N_TDC],
}

impl Default for ChainSummary {
    fn default() -> Self {
        Self {
            header: 0,
            trailer: 0,
            tdc_error: false,
            hits: std::array::from_fn(|_| Vec::with_capacity(16)),
        }
    }
}

impl ChainSummary {
    fn clear(&mut self) {
        self.header = 0;
        self.trailer = 0;
        self.tdc_error = false;
        for bucket in self.hits.iter_mut() {
            bucket.clear();
        }
    }

    pub fn header(&self) -> TrmChainHeader {
        TrmChainHeader(self.header)
    }

    pub fn trailer(&self) -> TrmChainTrailer {
        TrmChainTrailer(self.trailer)
    }

    pub fn n_hits(&self) -> usize {
        self.hits.iter().map(Vec::len).sum()
    }
}

/// Headers, trailers and chains of one TRM
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrmSummary {
    pub header: u32,
    pub trailer: u32,
    /// No hit was recorded in either chain
    pub empty: bool,
    pub chains: [ChainSummary; N_CHAIN],
}

impl TrmSummary {
    fn clear(&mut self) {
        self.header = 0;
        self.trailer = 0;
        self.empty = true;
        for chain in self.chains.iter_mut() {
            chain.clear();
        }
    }

    pub fn header(&self) -> TrmGlobalHeader {
        TrmGlobalHeader(self.header)
    }

    pub fn trailer(&self) -> TrmGlobalTrailer {
        TrmGlobalTrailer(self.trailer)
    }

    pub fn chain(&self, chain: Chain) -> &ChainSummary {
        &self.chains[chain.index()]
    }
}

/// Everything decoded from one crate event
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub page_header: PageHeader,
    pub drm_common_header: u32,
    pub drm_orbit_header: u32,
    pub drm_global_header: u32,
    pub drm_status_headers: [u32; 5],
    pub drm_global_trailer: u32,
    pub trms: [TrmSummary; N_TRM],
    /// Set by the checker, never by the decoder
    pub fault_flags: FaultFlags,
}

impl Default for Summary {
    fn default() -> Self {
        let mut summary = Self {
            page_header: PageHeader::default(),
            drm_common_header: 0,
            drm_orbit_header: 0,
            drm_global_header: 0,
            drm_status_headers: [0; 5],
            drm_global_trailer: 0,
            trms: Default::default(),
            fault_flags: FaultFlags::default(),
        };
        summary.clear();
        summary
    }
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every per-event field; the page header is kept
    pub fn clear(&mut self) {
        self.drm_common_header = 0;
        self.drm_orbit_header = 0;
        self.drm_global_header = 0;
        self.drm_status_headers = [0; 5];
        self.drm_global_trailer = 0;
        self.fault_flags = FaultFlags::default();
        for trm in self.trms.iter_mut() {
            trm.clear();
        }
    }

    pub fn drm_global_header(&self) -> DrmGlobalHeader {
        DrmGlobalHeader(self.drm_global_header)
    }

    pub fn drm_status_header1(&self) -> DrmStatusHeader1 {
        DrmStatusHeader1(self.drm_status_headers[0])
    }

    pub fn drm_status_header2(&self) -> DrmStatusHeader2 {
        DrmStatusHeader2(self.drm_status_headers[1])
    }

    pub fn drm_status_header3(&self) -> DrmStatusHeader3 {
        DrmStatusHeader3(self.drm_status_headers[2])
    }

    pub fn drm_global_trailer(&self) -> DrmGlobalTrailer {
        DrmGlobalTrailer(self.drm_global_trailer)
    }

    pub fn trm(&self, itrm: usize) -> &TrmSummary {
        &self.trms[itrm]
    }

    /// Total hits recorded across all buckets
    pub fn n_hits(&self) -> usize {
        self.trms
            .iter()
            .flat_map(|trm| trm.chains.iter())
            .map(ChainSummary::n_hits)
            .sum()
    }

    /// Append a hit to its (TRM, chain, TDC) bucket
    ///
    /// Returns false when the hit was not stored: its bucket is already full
    /// or its TDC id has no bucket.
    pub fn push_hit(&mut self, itrm: usize, chain: Chain, hit: UnpackedHit) -> bool {
        let trm = &mut self.trms[itrm];
        let Some(bucket) = trm.chains[chain.index()].hits.get_mut(hit.tdc_id() as usize) else {
            return false;
        };
        if bucket.len() >= MAX_HITS_PER_TDC {
            return false;
        }
        bucket.push(hit);
        trm.empty = false;
        true
    }
}
