//! Structural consistency checks over a decoded [`Summary`]
//!
//! The checker never stops the stream: every violation is recorded as a fault
//! bit on the summary (crate, module or chain level) and in the run counters.

use serde::Serialize;
use tracing::{debug, warn};

use super::format::Chain;
use super::summary::{trm_slot_id, Summary, N_CHAIN, N_TRM};

/// TRM event numbers are 10 bits wide
const TRM_EVENT_NUMBER_MODULO: u32 = 1024;

/// Run statistics for one chain position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainCounters {
    pub expected: u64,
    pub detected: u64,
    pub missing_trailer: u64,
    pub event_counter_mismatch: u64,
    pub bad_status: u64,
    pub bunch_id_mismatch: u64,
    pub tdc_error: u64,
}

/// Run statistics for one TRM slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrmCounters {
    pub expected: u64,
    pub detected: u64,
    pub missing_trailer: u64,
    pub event_counter_mismatch: u64,
    pub non_participating_header: u64,
    pub chains: [ChainCounters; N_CHAIN],
}

/// Run statistics accumulated over all checked events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckerCounters {
    pub events: u64,
    pub faulty_events: u64,
    pub missing_drm_header: u64,
    pub missing_drm_trailer: u64,
    pub slot_mask_mismatch: u64,
    pub trms: [TrmCounters; N_TRM],
}

impl CheckerCounters {
    /// Multi-line report of the non-zero counters
    pub fn report(&self) -> String {
        let mut out = format!(
            "events checked: {}, with fault: {}\n",
            self.events, self.faulty_events
        );
        if self.missing_drm_header > 0 || self.missing_drm_trailer > 0 {
            out.push_str(&format!(
                "  DRM: missing header {}, missing trailer {}\n",
                self.missing_drm_header, self.missing_drm_trailer
            ));
        }
        if self.slot_mask_mismatch > 0 {
            out.push_str(&format!(
                "  DRM: participating/enable mask mismatch {} (warning)\n",
                self.slot_mask_mismatch
            ));
        }
        for (itrm, trm) in self.trms.iter().enumerate() {
            if trm.expected == 0 && trm.non_participating_header == 0 {
                continue;
            }
            out.push_str(&format!(
                "  TRM slot {:2}: expected {} detected {} missing trailer {} event counter mismatch {} non-participating {}\n",
                trm_slot_id(itrm),
                trm.expected,
                trm.detected,
                trm.missing_trailer,
                trm.event_counter_mismatch,
                trm.non_participating_header
            ));
            for chain in Chain::ALL {
                let c = &trm.chains[chain.index()];
                out.push_str(&format!(
                    "    chain-{}: expected {} detected {} missing trailer {} event counter {} bad status {} bunch id {} tdc error {}\n",
                    chain,
                    c.expected,
                    c.detected,
                    c.missing_trailer,
                    c.event_counter_mismatch,
                    c.bad_status,
                    c.bunch_id_mismatch,
                    c.tdc_error
                ));
            }
        }
        out
    }
}

/// Consistency checker
#[derive(Debug, Default)]
pub struct Checker {
    dump_enabled: bool,
    counters: CheckerCounters,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every violation at warn level instead of debug
    pub fn set_dump_enabled(&mut self, enabled: bool) {
        self.dump_enabled = enabled;
    }

    pub fn counters(&self) -> &CheckerCounters {
        &self.counters
    }

    pub fn reset_counters(&mut self) {
        self.counters = CheckerCounters::default();
    }

    fn report(&self, msg: std::fmt::Arguments<'_>) {
        if self.dump_enabled {
            warn!("{}", msg);
        } else {
            debug!("{}", msg);
        }
    }

    /// Check one event, setting fault flags on `summary`
    ///
    /// Returns true when any fault was found.
    pub fn check(&mut self, summary: &mut Summary) -> bool {
        self.counters.events += 1;
        let fault = self.check_event(summary);
        if fault {
            self.counters.faulty_events += 1;
        }
        fault
    }

    fn check_event(&mut self, summary: &mut Summary) -> bool {
        let mut fault = false;

        if summary.drm_global_header == 0 {
            summary.fault_flags.set_crate();
            self.counters.missing_drm_header += 1;
            self.report(format_args!("Missing DRM global header"));
            return true;
        }
        if summary.drm_global_trailer == 0 {
            summary.fault_flags.set_crate();
            self.counters.missing_drm_trailer += 1;
            self.report(format_args!("Missing DRM global trailer"));
            return true;
        }

        let participating = summary.drm_status_header1().participating_mask();
        let enable_mask = summary.drm_status_header2().enable_mask();
        let l0_bcid = summary.drm_status_header3().l0_bcid();
        let local_event_counter = summary.drm_global_trailer().local_event_counter();

        if participating != enable_mask {
            self.counters.slot_mask_mismatch += 1;
            self.report(format_args!(
                "Enable/participating mask differ: {:03x}/{:03x}",
                enable_mask, participating
            ));
        }

        for itrm in 0..N_TRM {
            let slot = trm_slot_id(itrm);
            let trm = &summary.trms[itrm];

            if participating & (1 << (itrm + 1)) == 0 {
                if trm.header != 0 {
                    fault = true;
                    summary.fault_flags.set_trm(itrm);
                    self.counters.trms[itrm].non_participating_header += 1;
                    self.report(format_args!("Non-participating header found (slot {})", slot));
                }
                continue;
            }

            let counters = &mut self.counters.trms[itrm];
            counters.expected += 1;
            for chain in counters.chains.iter_mut() {
                chain.expected += 1;
            }

            if trm.header == 0 {
                fault = true;
                summary.fault_flags.set_trm(itrm);
                self.report(format_args!("Missing TRM header (slot {})", slot));
                continue;
            }
            self.counters.trms[itrm].detected += 1;

            if trm.trailer == 0 {
                fault = true;
                summary.fault_flags.set_trm(itrm);
                self.counters.trms[itrm].missing_trailer += 1;
                self.report(format_args!("Missing TRM trailer (slot {})", slot));
                continue;
            }

            let event_number = trm.header().event_number();
            if event_number != local_event_counter % TRM_EVENT_NUMBER_MODULO {
                fault = true;
                summary.fault_flags.set_trm(itrm);
                self.counters.trms[itrm].event_counter_mismatch += 1;
                self.report(format_args!(
                    "TRM event number / DRM local event counter mismatch: {} / {} (slot {})",
                    event_number, local_event_counter, slot
                ));
                continue;
            }

            for chain in Chain::ALL {
                if self.check_chain(summary, itrm, chain, local_event_counter, l0_bcid) {
                    fault = true;
                    summary.fault_flags.set_chain(itrm, chain);
                }
            }
        }

        fault
    }

    fn check_chain(
        &mut self,
        summary: &Summary,
        itrm: usize,
        chain: Chain,
        local_event_counter: u32,
        l0_bcid: u32,
    ) -> bool {
        let slot = trm_slot_id(itrm);
        let data = summary.trm(itrm).chain(chain);
        let counters = &mut self.counters.trms[itrm].chains[chain.index()];

        if data.tdc_error {
            counters.tdc_error += 1;
        }

        if data.header == 0 {
            self.report(format_args!("Missing TRM chain-{} header (slot {})", chain, slot));
            return true;
        }
        counters.detected += 1;

        if data.trailer == 0 {
            counters.missing_trailer += 1;
            self.report(format_args!("Missing TRM chain-{} trailer (slot {})", chain, slot));
            return true;
        }

        let mut fault = false;

        let event_counter = data.trailer().event_counter();
        if event_counter != local_event_counter {
            fault = true;
            counters.event_counter_mismatch += 1;
            self.report(format_args!(
                "TRM chain-{} event counter / DRM local event counter mismatch: {} / {} (slot {})",
                chain, event_counter, local_event_counter, slot
            ));
        }

        let counters = &mut self.counters.trms[itrm].chains[chain.index()];
        let status = data.trailer().status();
        if status != 0 {
            fault = true;
            counters.bad_status += 1;
            self.report(format_args!(
                "TRM chain-{} bad status: {} (slot {})",
                chain, status, slot
            ));
        }

        let counters = &mut self.counters.trms[itrm].chains[chain.index()];
        let bunch_id = data.header().bunch_id();
        if bunch_id != l0_bcid {
            fault = true;
            counters.bunch_id_mismatch += 1;
            self.report(format_args!(
                "TRM chain-{} bunch id / DRM L0 BCID mismatch: {} / {} (slot {})",
                chain, bunch_id, l0_bcid, slot
            ));
        }

        fault
    }
}
