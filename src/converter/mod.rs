//! Page-by-page raw to compressed conversion
//!
//! For every page: read the RDH, decode events until the page memory is
//! exhausted, check each event, pair its hits and encode it. Closing pages
//! (RDH only) are counted and skipped. A corrupt event stops the current page
//! but never the run. The encoder buffer is flushed to the sink after each
//! page, or earlier when it fills up.

use std::io::{Read, Write};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::common::CodecResult;
use crate::compressed::{EncodeError, Encoder, EncoderConfig};
use crate::raw::{Checker, CheckerCounters, PageReader, RawDecoder, RawDecoderConfig};

/// Totals over a converted run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub pages: u64,
    pub closing_pages: u64,
    pub events: u64,
    /// Events abandoned on a bad DRM common or global header
    pub fatal_events: u64,
    /// Events cut short by the page memory size
    pub truncated_events: u64,
    /// Events the encoder refused (field overflow)
    pub rejected_events: u64,
    /// Events larger than the whole encoder buffer
    pub oversized_events: u64,
    pub faulty_events: u64,
    pub recovered_words: u64,
    pub dropped_hits: u64,
    pub paired_hits: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub checker: CheckerCounters,
}

impl RunReport {
    pub fn summary_line(&self) -> String {
        format!(
            "pages {} (+{} closing), events {} ({} with fault, {} fatal, {} truncated, {} rejected, {} oversized), recovered words {}, hits {}, bytes {} -> {}",
            self.pages,
            self.closing_pages,
            self.events,
            self.faulty_events,
            self.fatal_events,
            self.truncated_events,
            self.rejected_events,
            self.oversized_events,
            self.recovered_words,
            self.paired_hits,
            self.bytes_in,
            self.bytes_out
        )
    }
}

/// Decoder, checker and (optionally) encoder driven over whole pages
#[derive(Debug)]
pub struct Converter {
    decoder: RawDecoder,
    checker: Checker,
    encoder: Option<Encoder>,
    report: RunReport,
}

impl Converter {
    /// Full pipeline: decode, check, pair and encode
    pub fn new(decoder: RawDecoderConfig, encoder: EncoderConfig) -> Self {
        let mut converter = Self::check_only(decoder);
        converter.encoder = Some(Encoder::new(encoder));
        converter
    }

    /// Decode and check only; nothing is written
    pub fn check_only(decoder: RawDecoderConfig) -> Self {
        let mut checker = Checker::new();
        checker.set_dump_enabled(decoder.dump_enabled);
        Self {
            decoder: RawDecoder::new(decoder),
            checker,
            encoder: None,
            report: RunReport::default(),
        }
    }

    pub fn report(&self) -> RunReport {
        let mut report = self.report.clone();
        report.checker = self.checker.counters().clone();
        report
    }

    pub fn page_size(&self) -> usize {
        self.decoder.config().page_size
    }

    /// Convert one page, writing the encoded output to `sink`
    pub fn process_page<W: Write>(&mut self, page: &[u8], sink: &mut W) -> CodecResult<()> {
        let mut reader = PageReader::new(page)?;
        self.report.bytes_in += page.len() as u64;

        if reader.header().is_empty_page() {
            self.report.closing_pages += 1;
            return Ok(());
        }
        self.report.pages += 1;
        debug!(
            memory_size = reader.header().memory_size,
            orbit = reader.header().trigger_orbit,
            "Processing page"
        );

        loop {
            let stats = match self.decoder.decode_event(&mut reader) {
                Ok(Some(stats)) => stats,
                Ok(None) => break,
                Err(e) if e.is_end_of_input() => {
                    warn!(error = %e, "Event truncated at end of page");
                    self.report.truncated_events += 1;
                    break;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        offset = reader.byte_offset(),
                        "Fatal event error, skipping rest of page"
                    );
                    self.report.fatal_events += 1;
                    break;
                }
            };

            self.report.events += 1;
            self.report.recovered_words += stats.words_recovered as u64;
            self.report.dropped_hits += stats.hits_dropped as u64;

            let (summary, hits) = self.decoder.output_mut();
            if self.checker.check(summary) {
                self.report.faulty_events += 1;
            }
            self.report.paired_hits += hits.len() as u64;

            if let Some(encoder) = self.encoder.as_mut() {
                let written = match encoder.encode(summary, hits) {
                    Err(EncodeError::BufferFull { .. }) if !encoder.buffer().is_empty() => {
                        self.report.bytes_out += encoder.flush_to(sink)? as u64;
                        encoder.encode(summary, hits)
                    }
                    other => other,
                };
                match written {
                    Ok(_) => {}
                    Err(e @ EncodeError::FieldOverflow { .. }) => {
                        warn!(error = %e, "Event not encoded");
                        self.report.rejected_events += 1;
                    }
                    // still full with an empty buffer: the event can never fit
                    Err(e @ EncodeError::BufferFull { .. }) => {
                        warn!(error = %e, "Event larger than the output buffer, not encoded");
                        self.report.oversized_events += 1;
                    }
                }
            }
        }

        if let Some(encoder) = self.encoder.as_mut() {
            self.report.bytes_out += encoder.flush_to(sink)? as u64;
        }
        Ok(())
    }

    /// Convert a whole raw file image; a trailing partial page is reported and ignored
    pub fn process_all<W: Write>(&mut self, data: &[u8], sink: &mut W) -> CodecResult<()> {
        let page_size = self.page_size();
        let pages = crate::raw::pages(data, page_size);
        let tail = pages.remainder().len();
        for page in pages {
            self.process_page(page, sink)?;
        }
        if tail > 0 {
            warn!(bytes = tail, "Ignoring partial page at end of input");
        }
        info!("{}", self.report().summary_line());
        Ok(())
    }

    /// Convert pages read from `reader` until end of input
    pub fn process_reader<R: Read, W: Write>(
        &mut self,
        reader: &mut R,
        sink: &mut W,
    ) -> CodecResult<()> {
        let mut page = vec![0u8; self.page_size()];
        loop {
            let n = read_full(reader, &mut page)?;
            if n < page.len() {
                if n > 0 {
                    warn!(bytes = n, "Ignoring partial page at end of input");
                }
                break;
            }
            self.process_page(&page, sink)?;
        }
        info!("{}", self.report().summary_line());
        Ok(())
    }
}

/// Fill `buf` from `reader`, returning fewer bytes only at end of input
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressed::CompressedDecoder;
    use crate::emulator::{Emulator, EmulatorConfig};

    #[test]
    fn test_convert_emulated_run() {
        let mut emulator = Emulator::new(EmulatorConfig {
            seed: 3,
            ..Default::default()
        });
        let mut raw = Vec::new();
        let stats = emulator.write_run(&mut raw, 4).unwrap();

        let mut converter = Converter::new(RawDecoderConfig::default(), EncoderConfig::default());
        let mut out = Vec::new();
        converter.process_all(&raw, &mut out).unwrap();

        let report = converter.report();
        assert_eq!(report.pages, 4);
        assert_eq!(report.closing_pages, 4);
        assert_eq!(report.events, stats.events);
        assert_eq!(report.faulty_events, 0);
        assert_eq!(report.bytes_out, out.len() as u64);
        assert_eq!(report.checker.events, stats.events);

        let events: Vec<_> = CompressedDecoder::new(&out).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len() as u64, stats.events);
        let hits: usize = events.iter().map(|e| e.n_hits()).sum();
        assert_eq!(hits as u64, report.paired_hits);
    }

    #[test]
    fn test_reader_matches_slice() {
        let mut raw = Vec::new();
        Emulator::new(EmulatorConfig::default())
            .write_run(&mut raw, 2)
            .unwrap();
        raw.extend([0u8; 100]);

        let mut a = Converter::new(RawDecoderConfig::default(), EncoderConfig::default());
        let mut out_a = Vec::new();
        a.process_all(&raw, &mut out_a).unwrap();

        let mut b = Converter::new(RawDecoderConfig::default(), EncoderConfig::default());
        let mut out_b = Vec::new();
        b.process_reader(&mut raw.as_slice(), &mut out_b).unwrap();

        assert_eq!(out_a, out_b);
        assert_eq!(a.report(), b.report());
    }

    #[test]
    fn test_check_only_writes_nothing() {
        let mut emulator = Emulator::new(EmulatorConfig::default());
        let page = emulator.generate_page();
        let mut converter = Converter::check_only(RawDecoderConfig::default());
        let mut out = Vec::new();
        converter.process_page(&page.bytes, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(converter.report().events, page.events.len() as u64);
    }

    #[test]
    fn test_fatal_event_stops_page_only() {
        let mut writer = crate::raw::RawPageWriter::new(8192);
        writer.extend([0x1234_5678, 0]);
        let bad = writer.finish();
        let good = Emulator::new(EmulatorConfig::default()).generate_page();

        let mut converter = Converter::new(RawDecoderConfig::default(), EncoderConfig::default());
        let mut out = Vec::new();
        converter.process_page(&bad, &mut out).unwrap();
        converter.process_page(&good.bytes, &mut out).unwrap();
        let report = converter.report();
        assert_eq!(report.fatal_events, 1);
        assert_eq!(report.pages, 2);
        assert_eq!(report.events, good.events.len() as u64);
    }

    #[test]
    fn test_oversized_event_is_skipped() {
        use crate::raw::format::{
            DrmGlobalHeader, DrmGlobalTrailer, DrmStatusHeader1, DrmStatusHeader2,
            DrmStatusHeader3, RawWord, TrmChainHeader, TrmChainTrailer, TrmGlobalHeader,
            TrmGlobalTrailer,
        };
        use crate::raw::{Chain, RawPageWriter, UnpackedHit};

        // one event with 40 unpaired hits, then one with none
        let mut writer = RawPageWriter::new(8192);
        for n_hits in [40u32, 0] {
            writer.extend([
                0x4000_0000,
                0,
                DrmGlobalHeader::new(1, 0).raw(),
                DrmStatusHeader1::new(0x2).raw(),
                DrmStatusHeader2::new(0x2).raw(),
                DrmStatusHeader3::new(0).raw(),
                0x4000_0001,
                0,
                TrmGlobalHeader::new(3, 0, 0).raw(),
                TrmChainHeader::new(Chain::A, 3, 0).raw(),
            ]);
            writer.extend((0..n_hits).map(|t| UnpackedHit::leading(t * 10, 0, 0).raw()));
            writer.extend([
                TrmChainTrailer::new(Chain::A, 0, 0).raw(),
                TrmGlobalTrailer::new(0).raw(),
                DrmGlobalTrailer::new(0).raw(),
            ]);
        }
        let page = writer.finish();

        let mut converter = Converter::new(
            RawDecoderConfig::default(),
            EncoderConfig {
                buffer_size: 64,
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        converter.process_page(&page, &mut out).unwrap();

        let report = converter.report();
        assert_eq!(report.events, 2);
        assert_eq!(report.oversized_events, 1);
        assert_eq!(report.rejected_events, 0);
        let events: Vec<_> = CompressedDecoder::new(&out).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].n_hits(), 0);

        // the run goes on with the next page
        let good = Emulator::new(EmulatorConfig {
            max_pulses_per_chain: 0,
            ..Default::default()
        })
        .generate_page();
        converter.process_page(&good.bytes, &mut out).unwrap();
        assert_eq!(converter.report().events, 2 + good.events.len() as u64);
    }

    #[test]
    fn test_small_buffer_flushes_mid_page() {
        let mut emulator = Emulator::new(EmulatorConfig {
            max_pulses_per_chain: 4,
            ..Default::default()
        });
        let page = emulator.generate_page();
        let mut converter = Converter::new(
            RawDecoderConfig::default(),
            EncoderConfig {
                buffer_size: 1024,
                ..Default::default()
            },
        );
        let mut out = Vec::new();
        converter.process_page(&page.bytes, &mut out).unwrap();
        let events: Vec<_> = CompressedDecoder::new(&out).collect::<Result<_, _>>().unwrap();
        assert_eq!(events.len(), page.events.len());
    }
}
