//! Raw TOF decoder
//!
//! Event grammar inside a page (after the RDH):
//!
//! ```text
//! DRM common header, DRM orbit header, DRM global header, DRM status 1..5
//!   { LTM header .. LTM trailer
//!   | TRM header
//!       [chain-A header {hit | TDC error} chain-A trailer]
//!       [chain-B header {hit | TDC error} chain-B trailer]
//!     TRM trailer [filler] }*
//! DRM global trailer [filler]
//! ```
//!
//! Only the DRM common and global headers are structural: if either is wrong
//! the event is abandoned. Any other unexpected word is skipped and decoding
//! resynchronises on the next recognisable word. All loops are bounded by the
//! page memory size through the cursor.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::cursor::WordCursor;
use super::format::{self, Chain, UnpackedHit};
use super::rdh::{read_page_header, PageHeader};
use super::spider::{pair_hits, PairedHit};
use super::summary::{Summary, N_TDC, N_TRM};
use super::DecodeError;

/// Raw decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDecoderConfig {
    /// CRU page size in bytes
    pub page_size: usize,
    /// Trace one line per decoded word
    pub dump_enabled: bool,
    /// Run the hit pairer after each decoded event
    pub pair_hits: bool,
}

impl Default for RawDecoderConfig {
    fn default() -> Self {
        Self {
            page_size: super::DEFAULT_PAGE_SIZE,
            dump_enabled: false,
            pair_hits: true,
        }
    }
}

/// Counters for one decoded event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    /// Payload bytes stepped over, padding excluded
    pub bytes: usize,
    /// Words matched against the event grammar
    pub words_recognized: usize,
    /// Unexpected words skipped to resynchronise, including hits with an
    /// out-of-range TDC id
    pub words_recovered: usize,
    /// Hits dropped because their TDC bucket was full
    pub hits_dropped: usize,
}

/// Page being decoded: its RDH and a payload cursor bounded by the memory size
#[derive(Debug, Clone)]
pub struct PageReader<'a> {
    header: PageHeader,
    cursor: WordCursor<'a>,
}

impl<'a> PageReader<'a> {
    /// Read the RDH at the start of `page` and position the cursor after it
    pub fn new(page: &'a [u8]) -> Result<Self, DecodeError> {
        let mut offset = 0;
        let header = read_page_header(page, &mut offset)?;
        let cursor = WordCursor::new(page, offset, header.memory_size as usize);
        Ok(Self { header, cursor })
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    /// More payload is available before the memory size bound
    pub fn has_more(&self) -> bool {
        !self.cursor.is_exhausted()
    }

    pub fn byte_offset(&self) -> usize {
        self.cursor.byte_offset()
    }
}

/// Raw decoder: fills a reusable [`Summary`] one event at a time
#[derive(Debug)]
pub struct RawDecoder {
    config: RawDecoderConfig,
    summary: Summary,
    paired_hits: Vec<PairedHit>,
    stats: EventStats,
    integrated_bytes: u64,
    events_decoded: u64,
}

impl RawDecoder {
    pub fn new(config: RawDecoderConfig) -> Self {
        Self {
            config,
            summary: Summary::new(),
            paired_hits: Vec::with_capacity(1024),
            stats: EventStats::default(),
            integrated_bytes: 0,
            events_decoded: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RawDecoderConfig::default())
    }

    pub fn config(&self) -> &RawDecoderConfig {
        &self.config
    }

    pub fn set_dump_enabled(&mut self, enabled: bool) {
        self.config.dump_enabled = enabled;
    }

    /// Summary of the last decoded event
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Mutable summary, for the checker to record fault flags
    pub fn summary_mut(&mut self) -> &mut Summary {
        &mut self.summary
    }

    /// Paired hits of the last decoded event (empty when pairing is disabled)
    pub fn paired_hits(&self) -> &[PairedHit] {
        &self.paired_hits
    }

    /// Summary and paired hits together, for the checker and encoder
    pub fn output_mut(&mut self) -> (&mut Summary, &[PairedHit]) {
        (&mut self.summary, &self.paired_hits)
    }

    pub fn integrated_bytes(&self) -> u64 {
        self.integrated_bytes
    }

    pub fn events_decoded(&self) -> u64 {
        self.events_decoded
    }

    /// Decode the next event of `page`
    ///
    /// Returns `Ok(None)` when the page memory is exhausted at an event
    /// boundary. A structural error abandons the event; the caller should stop
    /// consuming this page.
    pub fn decode_event(
        &mut self,
        page: &mut PageReader<'_>,
    ) -> Result<Option<EventStats>, DecodeError> {
        if !page.has_more() {
            return Ok(None);
        }

        self.summary.clear();
        self.summary.page_header = page.header;
        self.paired_hits.clear();
        self.stats = EventStats::default();
        page.cursor.reset_counter();

        let result = self.decode_drm(&mut page.cursor);
        self.stats.bytes = page.cursor.bytes_consumed();
        self.stats.words_recognized =
            self.stats.bytes / format::constants::WORD_SIZE - self.stats.words_recovered;
        self.integrated_bytes += self.stats.bytes as u64;
        result?;

        if self.config.pair_hits {
            pair_hits(&self.summary, &mut self.paired_hits);
        }
        self.events_decoded += 1;

        debug!(
            bytes = self.stats.bytes,
            recovered = self.stats.words_recovered,
            hits = self.summary.n_hits(),
            paired = self.paired_hits.len(),
            "Decoded event"
        );

        Ok(Some(self.stats))
    }

    fn dump(&self, cursor: &WordCursor<'_>, word: u32, what: &str) {
        if self.config.dump_enabled {
            trace!(
                "{:6} {:08x} {} {}",
                cursor.byte_offset(),
                word,
                what,
                format::describe(word)
            );
        }
    }

    fn recover(&mut self, cursor: &mut WordCursor<'_>, word: u32, context: &str) {
        warn!(
            offset = cursor.byte_offset(),
            "Unexpected word 0x{:08x} in {}, skipping",
            word,
            context
        );
        self.stats.words_recovered += 1;
        cursor.advance();
    }

    fn skip_filler(&self, cursor: &mut WordCursor<'_>) {
        if let Ok(word) = cursor.peek() {
            if format::is_filler(word) {
                self.dump(cursor, word, "filler");
                cursor.advance();
            }
        }
    }

    fn decode_drm(&mut self, cursor: &mut WordCursor<'_>) -> Result<(), DecodeError> {
        // DRM common header (structural)
        let word = cursor.peek()?;
        if !format::is_drm_common_header(word) {
            return Err(DecodeError::InvalidCommonHeader {
                word,
                offset: cursor.byte_offset(),
            });
        }
        self.dump(cursor, word, "DRM common header");
        self.summary.drm_common_header = word;
        cursor.advance();

        // DRM orbit header (positional)
        let word = cursor.peek()?;
        self.dump(cursor, word, "DRM orbit header");
        self.summary.drm_orbit_header = word;
        cursor.advance();

        // DRM global header (structural)
        let word = cursor.peek()?;
        if !format::is_drm_global_header(word) {
            return Err(DecodeError::InvalidGlobalHeader {
                word,
                offset: cursor.byte_offset(),
            });
        }
        self.dump(cursor, word, "DRM global header");
        self.summary.drm_global_header = word;
        cursor.advance();

        // DRM status headers 1..5 (positional)
        for i in 0..self.summary.drm_status_headers.len() {
            let word = cursor.peek()?;
            self.dump(cursor, word, "DRM status header");
            self.summary.drm_status_headers[i] = word;
            cursor.advance();
        }

        // DRM payload
        loop {
            let word = cursor.peek()?;

            if format::is_ltm_global_header(word) {
                self.decode_ltm(cursor)?;
                continue;
            }

            if format::is_trm_global_header(word) {
                self.decode_trm(cursor, word)?;
                continue;
            }

            if format::is_drm_global_trailer(word) {
                self.dump(cursor, word, "DRM global trailer");
                self.summary.drm_global_trailer = word;
                cursor.advance();
                self.skip_filler(cursor);
                return Ok(());
            }

            self.recover(cursor, word, "DRM payload");
        }
    }

    fn decode_ltm(&mut self, cursor: &mut WordCursor<'_>) -> Result<(), DecodeError> {
        let word = cursor.peek()?;
        self.dump(cursor, word, "LTM global header");
        cursor.advance();
        loop {
            let word = cursor.peek()?;
            if format::is_ltm_global_trailer(word) {
                self.dump(cursor, word, "LTM global trailer");
                cursor.advance();
                return Ok(());
            }
            self.dump(cursor, word, "LTM data");
            cursor.advance();
        }
    }

    fn decode_trm(&mut self, cursor: &mut WordCursor<'_>, header: u32) -> Result<(), DecodeError> {
        let slot = format::slot_id(header);
        let itrm = (slot - format::constants::FIRST_TRM_SLOT) as usize;
        if itrm >= N_TRM {
            self.recover(cursor, header, "TRM header (slot out of range)");
            return Ok(());
        }

        self.dump(cursor, header, "TRM global header");
        self.summary.trms[itrm].header = header;
        cursor.advance();

        for chain in Chain::ALL {
            let word = cursor.peek()?;
            if chain.is_header(word, slot) {
                self.dump(cursor, word, "TRM chain header");
                self.summary.trms[itrm].chains[chain.index()].header = word;
                cursor.advance();
                self.decode_chain(cursor, itrm, chain)?;
            }
        }

        let word = cursor.peek()?;
        if format::is_trm_global_trailer(word) {
            self.dump(cursor, word, "TRM global trailer");
            self.summary.trms[itrm].trailer = word;
            cursor.advance();
            self.skip_filler(cursor);
        } else {
            self.recover(cursor, word, "TRM payload");
        }
        Ok(())
    }

    fn decode_chain(
        &mut self,
        cursor: &mut WordCursor<'_>,
        itrm: usize,
        chain: Chain,
    ) -> Result<(), DecodeError> {
        loop {
            let word = cursor.peek()?;

            if format::is_tdc_hit(word) {
                let hit = UnpackedHit(word);
                if hit.tdc_id() as usize >= N_TDC {
                    self.recover(cursor, word, "TRM chain payload (TDC id out of range)");
                    continue;
                }
                self.dump(cursor, word, "");
                if !self.summary.push_hit(itrm, chain, hit) {
                    self.stats.hits_dropped += 1;
                    warn!(
                        slot = itrm + 3,
                        chain = %chain,
                        "TDC hit bucket full, dropping hit"
                    );
                }
                cursor.advance();
                continue;
            }

            if format::is_tdc_error(word) {
                self.dump(cursor, word, "");
                self.summary.trms[itrm].chains[chain.index()].tdc_error = true;
                cursor.advance();
                continue;
            }

            if chain.is_trailer(word) {
                self.dump(cursor, word, "TRM chain trailer");
                self.summary.trms[itrm].chains[chain.index()].trailer = word;
                cursor.advance();
                return Ok(());
            }

            // leave the chain; the TRM level decides what to do next
            self.recover(cursor, word, "TRM chain payload");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::format::{
        DrmGlobalHeader, DrmGlobalTrailer, DrmStatusHeader1, DrmStatusHeader2,
        DrmStatusHeader3, RawWord, TrmChainHeader, TrmChainTrailer, TrmGlobalHeader,
        TrmGlobalTrailer,
    };
    use crate::raw::summary::MAX_HITS_PER_TDC;
    use crate::raw::writer::RawPageWriter;

    fn drm_open(mask: u32, bcid: u32) -> Vec<u32> {
        vec![
            0x4000_0000,
            0x0000_1234,
            DrmGlobalHeader::new(7, 0).raw(),
            DrmStatusHeader1::new(mask).raw(),
            DrmStatusHeader2::new(mask).raw(),
            DrmStatusHeader3::new(bcid).raw(),
            0x4000_0001,
            0x0000_0000,
        ]
    }

    fn single_trm_event(hits: &[UnpackedHit]) -> Vec<u32> {
        let mut words = drm_open(0x2, 100);
        words.push(TrmGlobalHeader::new(3, 5, 0).raw());
        words.push(TrmChainHeader::new(Chain::A, 3, 100).raw());
        words.extend(hits.iter().map(|h| h.raw()));
        words.push(TrmChainTrailer::new(Chain::A, 5, 0).raw());
        words.push(TrmGlobalTrailer::new(0).raw());
        words.push(DrmGlobalTrailer::new(5).raw());
        words
    }

    fn page(words: &[u32]) -> Vec<u8> {
        let mut writer = RawPageWriter::new(8192);
        writer.extend(words.iter().copied());
        writer.finish()
    }

    #[test]
    fn test_decode_single_event() {
        let hits = [UnpackedHit::leading(100, 2, 4), UnpackedHit::trailing(150, 2, 4)];
        let words = single_trm_event(&hits);
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let stats = decoder.decode_event(&mut reader).unwrap().unwrap();

        assert_eq!(stats.bytes, words.len() * 4);
        assert_eq!(stats.words_recovered, 0);
        assert_eq!(stats.words_recognized, words.len());

        let summary = decoder.summary();
        assert_eq!(summary.drm_global_header().drm_id(), 7);
        assert_eq!(summary.drm_global_trailer().local_event_counter(), 5);
        assert_eq!(summary.trm(0).chain(Chain::A).hits[4].len(), 2);
        assert!(!summary.trm(0).empty);
        assert!(summary.trm(1).empty);
        assert_eq!(decoder.paired_hits().len(), 1);
        assert_eq!(decoder.paired_hits()[0].width, 50);

        assert_eq!(decoder.decode_event(&mut reader).unwrap(), None);
    }

    #[test]
    fn test_invalid_common_header_is_fatal() {
        let data = page(&[0x1234_5678, 0, 0, 0]);
        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let err = decoder.decode_event(&mut reader).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidCommonHeader { word: 0x1234_5678, .. }));
        assert!(!err.is_end_of_input());
    }

    #[test]
    fn test_invalid_global_header_is_fatal() {
        let data = page(&[0x4000_0000, 0, 0x5000_0001, 0]);
        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        assert!(matches!(
            decoder.decode_event(&mut reader),
            Err(DecodeError::InvalidGlobalHeader { .. })
        ));
    }

    #[test]
    fn test_garbage_payload_terminates_on_memory_size() {
        let mut words = drm_open(0x2, 0);
        words.extend(std::iter::repeat(0x7000_1234).take(40));
        let data = page(&words);
        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let err = decoder.decode_event(&mut reader).unwrap_err();
        assert!(matches!(err, DecodeError::MemoryExhausted { .. }));
        assert!(err.is_end_of_input());
    }

    #[test]
    fn test_unknown_word_in_chain_is_recovered() {
        let mut words = drm_open(0x2, 100);
        words.push(TrmGlobalHeader::new(3, 5, 0).raw());
        words.push(TrmChainHeader::new(Chain::A, 3, 100).raw());
        words.push(UnpackedHit::leading(10, 0, 0).raw());
        words.push(0x5000_0002); // LTM trailer: meaningless here
        words.push(TrmGlobalTrailer::new(0).raw());
        words.push(DrmGlobalTrailer::new(5).raw());
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let stats = decoder.decode_event(&mut reader).unwrap().unwrap();
        assert_eq!(stats.words_recovered, 1);
        assert_eq!(decoder.summary().trm(0).chain(Chain::A).trailer, 0);
        assert_ne!(decoder.summary().trm(0).trailer, 0);
        assert_ne!(decoder.summary().drm_global_trailer, 0);
    }

    #[test]
    fn test_ltm_block_is_skipped() {
        let mut words = drm_open(0x1, 0);
        words.extend([0x4000_0002, 0x1111_1111, 0x2222_2222, 0x5000_0002]);
        words.push(DrmGlobalTrailer::new(1).raw());
        words.push(format::constants::FILLER);
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let stats = decoder.decode_event(&mut reader).unwrap().unwrap();
        assert_eq!(stats.words_recovered, 0);
        assert_eq!(stats.bytes, words.len() * 4);
        assert!(!reader.has_more());
    }

    #[test]
    fn test_tdc_error_flag() {
        let mut words = drm_open(0x2, 0);
        words.push(TrmGlobalHeader::new(3, 0, 0).raw());
        words.push(TrmChainHeader::new(Chain::A, 3, 0).raw());
        words.push(0x6000_0010);
        words.push(TrmChainTrailer::new(Chain::A, 0, 0).raw());
        words.push(TrmGlobalTrailer::new(0).raw());
        words.push(DrmGlobalTrailer::new(0).raw());
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        decoder.decode_event(&mut reader).unwrap();
        assert!(decoder.summary().trm(0).chain(Chain::A).tdc_error);
        assert!(!decoder.summary().trm(0).chain(Chain::B).tdc_error);
    }

    #[test]
    fn test_out_of_range_tdc_hit_is_skipped() {
        let hits = [UnpackedHit::leading(100, 2, 15), UnpackedHit::trailing(150, 2, 0)];
        let words = single_trm_event(&hits);
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let stats = decoder.decode_event(&mut reader).unwrap().unwrap();
        assert_eq!(stats.words_recovered, 1);
        assert_eq!(stats.words_recognized, words.len() - 1);
        assert_eq!(stats.bytes, words.len() * 4);

        let chain = decoder.summary().trm(0).chain(Chain::A);
        assert_eq!(chain.n_hits(), 1);
        assert_eq!(chain.hits[0].len(), 1);
        assert_ne!(chain.trailer, 0);
        // the trailing edge on TDC 0 has no leading partner
        assert!(decoder.paired_hits().is_empty());
    }

    #[test]
    fn test_full_bucket_drops_extra_hits() {
        let hits: Vec<UnpackedHit> = (0..MAX_HITS_PER_TDC as u32 + 1)
            .map(|t| UnpackedHit::leading(t, 1, 3))
            .collect();
        let words = single_trm_event(&hits);
        let data = page(&words);

        let mut decoder = RawDecoder::with_defaults();
        let mut reader = PageReader::new(&data).unwrap();
        let stats = decoder.decode_event(&mut reader).unwrap().unwrap();
        assert_eq!(stats.hits_dropped, 1);
        assert_eq!(stats.words_recovered, 0);
        let chain = decoder.summary().trm(0).chain(Chain::A);
        assert_eq!(chain.hits[3].len(), MAX_HITS_PER_TDC);
        assert_eq!(decoder.paired_hits().len(), MAX_HITS_PER_TDC);
        assert!(decoder.paired_hits().iter().all(|h| h.width == 0));
    }

    #[test]
    fn test_pairing_disabled() {
        let hits = [UnpackedHit::leading(100, 2, 4), UnpackedHit::trailing(150, 2, 4)];
        let data = page(&single_trm_event(&hits));
        let mut decoder = RawDecoder::new(RawDecoderConfig {
            pair_hits: false,
            ..Default::default()
        });
        let mut reader = PageReader::new(&data).unwrap();
        decoder.decode_event(&mut reader).unwrap();
        assert!(decoder.paired_hits().is_empty());
        assert_eq!(decoder.summary().n_hits(), 2);
    }

    #[test]
    fn test_config_default() {
        let config = RawDecoderConfig::default();
        assert_eq!(config.page_size, 8192);
        assert!(!config.dump_enabled);
        assert!(config.pair_hits);
    }
}
