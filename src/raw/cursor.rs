//! Carrier-aware 32-bit word cursor
//!
//! After the RDH, payload words travel inside 128-bit carrier lines: each line
//! holds two 32-bit payload words in its low 64 bits, the high 64 bits are
//! padding. Reading consecutive payload words therefore steps by 1 slot, then
//! 3 slots, then 1, ... The step is derived from the cursor's slot within its
//! line, never carried as separate state.
//!
//! ```text
//!   line n   | slot 0 | slot 1 | slot 2 | slot 3 |
//!            | word k | word k+1 |  pad  |  pad  |
//! ```

use super::format::constants::WORD_SIZE;
use super::DecodeError;

/// u32 slots per 128-bit carrier line
pub const SLOTS_PER_LINE: usize = 4;
/// Payload words per carrier line
pub const PAYLOAD_SLOTS: usize = 2;

/// Slots to advance from `slot_in_line` to the next payload word
#[inline]
pub fn stride(slot_in_line: usize) -> usize {
    if slot_in_line == 0 {
        1
    } else {
        SLOTS_PER_LINE - slot_in_line
    }
}

/// Cursor over the payload words of one page
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    data: &'a [u8],
    /// Position in u32 slots from the start of `data`
    slot: usize,
    /// Byte bound from the start of `data` (the page memory size)
    limit: usize,
    /// Payload bytes stepped over since the last `reset_counter`
    bytes_consumed: usize,
}

impl<'a> WordCursor<'a> {
    /// Cursor at byte `offset` of `data`, bounded by `limit` bytes
    ///
    /// `offset` must be 4-byte aligned. `limit` is clamped to the buffer size.
    pub fn new(data: &'a [u8], offset: usize, limit: usize) -> Self {
        Self {
            data,
            slot: offset / WORD_SIZE,
            limit: limit.min(data.len()),
            bytes_consumed: 0,
        }
    }

    /// Current byte offset from the start of the page
    pub fn byte_offset(&self) -> usize {
        self.slot * WORD_SIZE
    }

    /// Slot within the current 128-bit line
    pub fn slot_in_line(&self) -> usize {
        self.slot % SLOTS_PER_LINE
    }

    /// Payload bytes consumed since the last counter reset
    pub fn bytes_consumed(&self) -> usize {
        self.bytes_consumed
    }

    pub fn reset_counter(&mut self) {
        self.bytes_consumed = 0;
    }

    /// True once the cursor has reached the page memory bound
    pub fn is_exhausted(&self) -> bool {
        self.byte_offset() >= self.limit
    }

    /// Current word without advancing
    pub fn peek(&self) -> Result<u32, DecodeError> {
        let offset = self.byte_offset();
        if offset >= self.limit {
            return Err(DecodeError::MemoryExhausted {
                offset,
                memory_size: self.limit,
            });
        }
        if offset + WORD_SIZE > self.data.len() {
            return Err(DecodeError::Truncated {
                needed: WORD_SIZE,
                available: self.data.len().saturating_sub(offset),
            });
        }
        Ok(u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]))
    }

    /// Step to the next payload word
    pub fn advance(&mut self) {
        self.slot += stride(self.slot_in_line());
        self.bytes_consumed += WORD_SIZE;
    }

    /// Current word, then advance
    pub fn next_word(&mut self) -> Result<u32, DecodeError> {
        let word = self.peek()?;
        self.advance();
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carrier(words: &[u32]) -> Vec<u8> {
        // two payload words per 16-byte line, padding marked 0xFFFFFFFF
        let mut data = Vec::new();
        for pair in words.chunks(2) {
            let mut line = [0xFFFF_FFFFu32; 4];
            line[..pair.len()].copy_from_slice(pair);
            for w in line {
                data.extend_from_slice(&w.to_le_bytes());
            }
        }
        data
    }

    #[test]
    fn test_stride_pattern() {
        assert_eq!(stride(0), 1);
        assert_eq!(stride(1), 3);
        assert_eq!(stride(2), 2);
        assert_eq!(stride(3), 1);
    }

    #[test]
    fn test_cursor_skips_padding() {
        let words = [1, 2, 3, 4, 5, 6, 7];
        let data = carrier(&words);
        let mut cursor = WordCursor::new(&data, 0, data.len());
        for expected in words {
            assert_eq!(cursor.next_word().unwrap(), expected);
        }
        assert_eq!(cursor.bytes_consumed(), words.len() * 4);
    }

    #[test]
    fn test_cursor_starting_on_second_slot() {
        let data = carrier(&[10, 11, 12, 13]);
        let mut cursor = WordCursor::new(&data, 4, data.len());
        assert_eq!(cursor.next_word().unwrap(), 11);
        assert_eq!(cursor.next_word().unwrap(), 12);
        assert_eq!(cursor.byte_offset(), 20);
    }

    #[test]
    fn test_cursor_stops_at_memory_limit() {
        let data = carrier(&[1, 2, 3, 4]);
        // limit after the first line
        let mut cursor = WordCursor::new(&data, 0, 16);
        assert_eq!(cursor.next_word().unwrap(), 1);
        assert_eq!(cursor.next_word().unwrap(), 2);
        assert!(cursor.is_exhausted());
        assert!(matches!(
            cursor.peek(),
            Err(DecodeError::MemoryExhausted { offset: 16, .. })
        ));
    }

    #[test]
    fn test_cursor_limit_clamped_to_buffer() {
        let data = carrier(&[1, 2]);
        let mut cursor = WordCursor::new(&data, 0, 1 << 20);
        assert_eq!(cursor.next_word().unwrap(), 1);
        assert_eq!(cursor.next_word().unwrap(), 2);
        assert!(cursor.next_word().is_err());
    }
}
