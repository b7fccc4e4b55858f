//! Leading/trailing edge hit pairing
//!
//! Within one (TRM, chain, TDC) bucket every unconsumed leading hit is matched
//! with the first later trailing hit on the same channel. Arrival order is not
//! time order, so the search scans forward through the whole bucket. A
//! trailing hit is consumed by at most one leading hit; a leading hit without
//! a match is kept with zero width.

use serde::{Deserialize, Serialize};

use super::format::{constants::HIT_TIME_MASK, Chain, EdgeMarker, UnpackedHit};
use super::summary::{trm_slot_id, Summary};

/// Time bits below the compressed frame id
pub const FRAME_SHIFT: u32 = 13;

/// Frame index of an absolute hit time (8192 time units per frame)
#[inline]
pub fn frame_of(time: u32) -> u32 {
    time >> FRAME_SHIFT
}

/// A leading edge with its time-over-threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedHit {
    /// TRM index (0..10, slot id - 3)
    pub trm: u8,
    pub chain: Chain,
    pub tdc_id: u8,
    pub channel: u8,
    /// Absolute leading-edge time
    pub time: u32,
    /// Trailing minus leading time, modulo the 21-bit TDC range; 0 when unmatched
    pub width: u32,
    pub e_bit: bool,
}

impl PairedHit {
    pub fn frame(&self) -> u32 {
        frame_of(self.time)
    }

    pub fn slot_id(&self) -> u32 {
        trm_slot_id(self.trm as usize)
    }
}

/// Pair the hits of one bucket, calling `emit(leading, width)` in arrival order of the leading hits
pub fn pair_bucket(hits: &[UnpackedHit], mut emit: impl FnMut(UnpackedHit, u32)) {
    let mut consumed = vec![false; hits.len()];
    for (i, leading) in hits.iter().enumerate() {
        if leading.marker() != EdgeMarker::Leading {
            continue;
        }
        let mut width = 0;
        for j in i + 1..hits.len() {
            let trailing = hits[j];
            if consumed[j]
                || trailing.marker() != EdgeMarker::Trailing
                || trailing.channel() != leading.channel()
            {
                continue;
            }
            width = trailing.time().wrapping_sub(leading.time()) & HIT_TIME_MASK;
            consumed[j] = true;
            break;
        }
        emit(*leading, width);
    }
}

/// Pair every bucket of `summary` into `out` (cleared first), ordered by TRM, chain, TDC
pub fn pair_hits(summary: &Summary, out: &mut Vec<PairedHit>) {
    out.clear();
    for (itrm, trm) in summary.trms.iter().enumerate() {
        if trm.empty {
            continue;
        }
        for chain in Chain::ALL {
            for (itdc, bucket) in trm.chain(chain).hits.iter().enumerate() {
                if bucket.is_empty() {
                    continue;
                }
                pair_bucket(bucket, |leading, width| {
                    out.push(PairedHit {
                        trm: itrm as u8,
                        chain,
                        tdc_id: itdc as u8,
                        channel: leading.channel() as u8,
                        time: leading.time(),
                        width,
                        e_bit: leading.e_bit(),
                    })
                });
            }
        }
    }
}
