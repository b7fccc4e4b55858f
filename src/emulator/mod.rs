//! Synthetic raw event generator
//!
//! Produces protocol-conforming DRM/TRM events from a seeded RNG: every
//! participating TRM gets both chains, each chain a random number of pulses
//! written as a leading hit immediately followed by its trailing hit. The
//! expected pairer output is kept alongside the words so tests can compare.
//! Chains can be given a non-zero status with a configurable probability.

use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::raw::format::constants::{DRM_COMMON_HEADER, FILLER, HIT_TIME_MASK};
use crate::raw::format::{
    Chain, DrmGlobalHeader, DrmGlobalTrailer, DrmStatusHeader1, DrmStatusHeader2,
    DrmStatusHeader3, RawWord, TrmChainHeader, TrmChainTrailer, TrmGlobalHeader,
    TrmGlobalTrailer, UnpackedHit,
};
use crate::raw::rdh::PageHeader;
use crate::raw::spider::PairedHit;
use crate::raw::summary::{trm_slot_id, N_TDC, N_TRM};
use crate::raw::writer::{closing_page, RawPageWriter};

/// Bunch crossings per LHC orbit
const BUNCHES_PER_ORBIT: u32 = 3564;
const CHANNELS_PER_TDC: u32 = 8;
/// All ten TRM bits of the participating mask (bit i+1 = TRM index i)
pub const ALL_TRMS_MASK: u32 = 0x7FE;

/// Emulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// RNG seed; the same seed gives the same byte stream
    pub seed: u64,
    /// CRU page size in bytes
    pub page_size: usize,
    /// Upper bound on events packed into one page
    pub events_per_page: usize,
    /// Participating TRMs, bit i+1 for TRM index i
    pub participating_mask: u32,
    /// Pulses per chain are drawn uniformly from 0..=max
    pub max_pulses_per_chain: usize,
    /// Pulse widths are drawn uniformly from min_width..=max_width
    pub min_width: u32,
    pub max_width: u32,
    /// Probability that a chain trailer carries a non-zero status
    pub bad_status_probability: f64,
    pub drm_id: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            page_size: crate::raw::DEFAULT_PAGE_SIZE,
            events_per_page: 4,
            participating_mask: ALL_TRMS_MASK,
            max_pulses_per_chain: 8,
            min_width: 10,
            max_width: 1500,
            bad_status_probability: 0.0,
            drm_id: 1,
        }
    }
}

/// One generated event
#[derive(Debug, Clone)]
pub struct EmulatedEvent {
    /// Payload words, padded with a filler to an even count
    pub words: Vec<u32>,
    /// Hits the pairer should produce, in pairer order
    pub pulses: Vec<PairedHit>,
    /// (TRM index, chain) given a bad status
    pub bad_chains: Vec<(usize, Chain)>,
    pub local_event_counter: u32,
    pub bunch_id: u32,
}

/// One generated page and the events it carries
#[derive(Debug, Clone)]
pub struct EmulatedPage {
    pub bytes: Vec<u8>,
    pub events: Vec<EmulatedEvent>,
}

/// Totals of a written run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmulatorStats {
    pub pages: u64,
    pub events: u64,
    pub pulses: u64,
    pub bytes: u64,
}

/// Raw event generator
#[derive(Debug)]
pub struct Emulator {
    config: EmulatorConfig,
    rng: StdRng,
    event_counter: u32,
    orbit: u32,
    pages_counter: u16,
    pending: Option<EmulatedEvent>,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            event_counter: 0,
            orbit: 0,
            pages_counter: 0,
            pending: None,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Generate the next event
    pub fn generate_event(&mut self) -> EmulatedEvent {
        let lec = self.event_counter & 0xFFF;
        self.event_counter = self.event_counter.wrapping_add(1);
        let bunch_id = self.rng.gen_range(0..BUNCHES_PER_ORBIT);
        let mask = self.config.participating_mask & ALL_TRMS_MASK;

        let mut words = vec![
            DRM_COMMON_HEADER,
            self.orbit,
            0, // global header, filled once the length is known
            DrmStatusHeader1::new(mask).raw(),
            DrmStatusHeader2::new(mask).raw(),
            DrmStatusHeader3::new(bunch_id).raw(),
            0,
            0,
        ];
        let mut pulses = Vec::new();
        let mut bad_chains = Vec::new();

        for itrm in 0..N_TRM {
            if mask & (1 << (itrm + 1)) == 0 {
                continue;
            }
            let slot = trm_slot_id(itrm);
            let trm_start = words.len();
            words.push(0);

            for chain in Chain::ALL {
                words.push(TrmChainHeader::new(chain, slot, bunch_id).raw());
                for pulse in self.generate_pulses(itrm, chain) {
                    let (channel, tdc) = (pulse.channel as u32, pulse.tdc_id as u32);
                    let trailing = pulse.time.wrapping_add(pulse.width) & HIT_TIME_MASK;
                    words.push(UnpackedHit::leading(pulse.time, channel, tdc).raw());
                    words.push(UnpackedHit::trailing(trailing, channel, tdc).raw());
                    pulses.push(pulse);
                }
                let p_bad = self.config.bad_status_probability.clamp(0.0, 1.0);
                let status = if self.rng.gen_bool(p_bad) {
                    bad_chains.push((itrm, chain));
                    self.rng.gen_range(1..16)
                } else {
                    0
                };
                words.push(TrmChainTrailer::new(chain, lec, status).raw());
            }

            words.push(TrmGlobalTrailer::new(0).raw());
            let trm_words = (words.len() - trm_start) as u32;
            words[trm_start] = TrmGlobalHeader::new(slot, lec % 1024, trm_words).raw();
        }

        words.push(DrmGlobalTrailer::new(lec).raw());
        if words.len() % 2 == 1 {
            words.push(FILLER);
        }
        words[2] = DrmGlobalHeader::new(self.config.drm_id, words.len() as u32).raw();

        EmulatedEvent {
            words,
            pulses,
            bad_chains,
            local_event_counter: lec,
            bunch_id,
        }
    }

    /// Pulses of one chain, sorted by TDC as the pairer walks them
    fn generate_pulses(&mut self, itrm: usize, chain: Chain) -> Vec<PairedHit> {
        let n = self.rng.gen_range(0..=self.config.max_pulses_per_chain);
        let max_width = self.config.max_width.max(self.config.min_width);
        let mut pulses: Vec<PairedHit> = (0..n)
            .map(|_| {
                let width = self.rng.gen_range(self.config.min_width..=max_width);
                PairedHit {
                    trm: itrm as u8,
                    chain,
                    tdc_id: self.rng.gen_range(0..N_TDC as u8),
                    channel: self.rng.gen_range(0..CHANNELS_PER_TDC as u8),
                    time: self.rng.gen_range(0..=HIT_TIME_MASK.saturating_sub(width)),
                    width,
                    e_bit: false,
                }
            })
            .collect();
        pulses.sort_by_key(|p| p.tdc_id);
        pulses
    }

    fn page_header(&self) -> PageHeader {
        PageHeader {
            header_version: 6,
            fee_id: self.config.drm_id as u16,
            trigger_orbit: self.orbit,
            heartbeat_orbit: self.orbit,
            pages_counter: self.pages_counter,
            ..Default::default()
        }
    }

    /// Fill one page with up to `events_per_page` events
    ///
    /// An event that does not fit is carried over to the next page. An event
    /// larger than an empty page is dropped with a warning and the page is
    /// closed empty.
    pub fn generate_page(&mut self) -> EmulatedPage {
        let mut writer = RawPageWriter::with_header(self.config.page_size, self.page_header());
        let mut events = Vec::new();

        while events.len() < self.config.events_per_page.max(1) {
            let event = match self.pending.take() {
                Some(event) => event,
                None => self.generate_event(),
            };
            if !writer.fits(event.words.len()) {
                if writer.is_empty() {
                    warn!(
                        words = event.words.len(),
                        page_size = self.config.page_size,
                        "Event larger than a page, dropped"
                    );
                    break;
                }
                self.pending = Some(event);
                break;
            }
            writer.extend(event.words.iter().copied());
            events.push(event);
        }

        self.pages_counter = self.pages_counter.wrapping_add(1);
        debug!(events = events.len(), words = writer.len(), "Generated page");
        EmulatedPage {
            bytes: writer.finish(),
            events,
        }
    }

    /// Write `n_pages` data pages, each followed by a closing header-only page
    pub fn write_run<W: Write>(
        &mut self,
        writer: &mut W,
        n_pages: usize,
    ) -> std::io::Result<EmulatorStats> {
        let mut stats = EmulatorStats::default();
        for _ in 0..n_pages {
            let page = self.generate_page();
            writer.write_all(&page.bytes)?;
            let closing = closing_page(self.config.page_size, self.page_header());
            writer.write_all(&closing)?;

            stats.pages += 1;
            stats.events += page.events.len() as u64;
            stats.pulses += page.events.iter().map(|e| e.pulses.len() as u64).sum::<u64>();
            stats.bytes += (page.bytes.len() + closing.len()) as u64;
            self.orbit = self.orbit.wrapping_add(1);
        }
        info!(
            pages = stats.pages,
            events = stats.events,
            pulses = stats.pulses,
            "Emulated run written"
        );
        Ok(stats)
    }
}
