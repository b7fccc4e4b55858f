//! CRU page builder
//!
//! Lays payload words into the 128-bit carrier (two words per 16-byte line,
//! the other two slots zero), prepends the RDH and pads the page to its fixed
//! size. Used by the emulator and by tests to produce decodable input.

use super::cursor::{PAYLOAD_SLOTS, SLOTS_PER_LINE};
use super::format::constants::WORD_SIZE;
use super::rdh::{PageHeader, RDH_SIZE};

const LINE_SIZE: usize = SLOTS_PER_LINE * WORD_SIZE;

/// Memory size that ends the cursor exactly after `n_words` payload words
pub fn memory_size_for(n_words: usize) -> usize {
    RDH_SIZE + LINE_SIZE * (n_words / PAYLOAD_SLOTS) + WORD_SIZE * (n_words % PAYLOAD_SLOTS)
}

/// Payload words that fit in a page of `page_size` bytes
pub fn page_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(RDH_SIZE) / LINE_SIZE * PAYLOAD_SLOTS
}

/// Builds one page
#[derive(Debug, Clone)]
pub struct RawPageWriter {
    page_size: usize,
    header: PageHeader,
    words: Vec<u32>,
}

impl RawPageWriter {
    pub fn new(page_size: usize) -> Self {
        Self::with_header(page_size, PageHeader::default())
    }

    /// Writer whose RDH starts from `header`; memory size and header size are set on finish
    pub fn with_header(page_size: usize, header: PageHeader) -> Self {
        Self {
            page_size,
            header,
            words: Vec::with_capacity(page_capacity(page_size)),
        }
    }

    pub fn header_mut(&mut self) -> &mut PageHeader {
        &mut self.header
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Payload words that still fit
    pub fn remaining(&self) -> usize {
        page_capacity(self.page_size).saturating_sub(self.words.len())
    }

    /// True if `n_words` more words fit in the page
    pub fn fits(&self, n_words: usize) -> bool {
        n_words <= self.remaining()
    }

    /// Append one payload word
    ///
    /// Nothing stops the page from overflowing here; check `fits` first.
    pub fn push(&mut self, word: u32) {
        self.words.push(word);
    }

    pub fn extend(&mut self, words: impl IntoIterator<Item = u32>) {
        self.words.extend(words);
    }

    /// Serialize the page and reset the writer for the next one
    ///
    /// The result is `page_size` bytes long unless the payload overflowed it.
    pub fn finish(&mut self) -> Vec<u8> {
        let memory_size = memory_size_for(self.words.len());
        self.header.header_size = RDH_SIZE as u8;
        self.header.memory_size = memory_size.min(u16::MAX as usize) as u16;

        let mut page = Vec::with_capacity(self.page_size.max(memory_size));
        page.extend_from_slice(&self.header.to_bytes());
        for pair in self.words.chunks(PAYLOAD_SLOTS) {
            let mut line = [0u32; SLOTS_PER_LINE];
            line[..pair.len()].copy_from_slice(pair);
            for word in line {
                page.extend_from_slice(&word.to_le_bytes());
            }
        }
        if page.len() < self.page_size {
            page.resize(self.page_size, 0);
        }

        self.words.clear();
        self.header.pages_counter = self.header.pages_counter.wrapping_add(1);
        page
    }
}

/// Header-only page that closes a heartbeat frame
pub fn closing_page(page_size: usize, mut header: PageHeader) -> Vec<u8> {
    header.stop_bit = 1;
    let mut writer = RawPageWriter::with_header(page_size, header);
    writer.finish()
}
