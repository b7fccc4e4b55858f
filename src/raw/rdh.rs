//! Raw Data Header (RDH) reader
//!
//! Every CRU page opens with four 128-bit RDH words. The layout is positional:
//! nothing in a single word identifies it, so the reader simply consumes
//! 16 bytes per word and extracts fields by position.

use serde::{Deserialize, Serialize};

use super::DecodeError;

/// Size of one 128-bit RDH word
pub const RDH_WORD_SIZE: usize = 16;
/// Number of 128-bit words in a page header
pub const RDH_WORDS: usize = 4;
/// Size of a complete page header
pub const RDH_SIZE: usize = RDH_WORD_SIZE * RDH_WORDS;
/// Largest page whose memory size fits the 16-bit header field
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize;

/// Decoded page header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageHeader {
    // word 0
    pub header_version: u8,
    pub header_size: u8,
    pub block_length: u16,
    pub fee_id: u16,
    pub priority: u8,
    pub offset_new_packet: u16,
    /// Bytes of the page in use, counted from the first RDH byte
    pub memory_size: u16,
    pub packet_counter: u8,
    pub cru_id: u16,
    pub data_path_wrapper: u8,
    // word 1
    pub trigger_orbit: u32,
    pub heartbeat_orbit: u32,
    // word 2
    pub trigger_bc: u16,
    pub heartbeat_bc: u16,
    pub trigger_type: u32,
    // word 3
    pub detector_field: u16,
    pub par: u16,
    pub stop_bit: u8,
    pub pages_counter: u16,
}

/// Read one 128-bit RDH word as four little-endian u32, advancing `offset` by 16
pub fn read_rdh_word(data: &[u8], offset: &mut usize) -> Result<[u32; 4], DecodeError> {
    let available = data.len().saturating_sub(*offset);
    if available < RDH_WORD_SIZE {
        return Err(DecodeError::Truncated {
            needed: RDH_WORD_SIZE,
            available,
        });
    }
    let mut words = [0u32; 4];
    for (i, word) in words.iter_mut().enumerate() {
        let start = *offset + i * 4;
        *word = u32::from_le_bytes([
            data[start],
            data[start + 1],
            data[start + 2],
            data[start + 3],
        ]);
    }
    *offset += RDH_WORD_SIZE;
    Ok(words)
}

/// Read a complete page header (four RDH words) starting at `offset`
pub fn read_page_header(data: &[u8], offset: &mut usize) -> Result<PageHeader, DecodeError> {
    let w0 = read_rdh_word(data, offset)?;
    let w1 = read_rdh_word(data, offset)?;
    let w2 = read_rdh_word(data, offset)?;
    let w3 = read_rdh_word(data, offset)?;

    let header = PageHeader {
        header_version: (w0[0] & 0xFF) as u8,
        header_size: ((w0[0] >> 8) & 0xFF) as u8,
        block_length: (w0[0] >> 16) as u16,
        fee_id: (w0[1] & 0xFFFF) as u16,
        priority: ((w0[1] >> 16) & 0xFF) as u8,
        offset_new_packet: (w0[2] & 0xFFFF) as u16,
        memory_size: (w0[2] >> 16) as u16,
        packet_counter: ((w0[3] >> 8) & 0xFF) as u8,
        cru_id: ((w0[3] >> 16) & 0xFFF) as u16,
        data_path_wrapper: ((w0[3] >> 28) & 0xF) as u8,
        trigger_orbit: w1[0],
        heartbeat_orbit: w1[1],
        trigger_bc: (w2[0] & 0xFFF) as u16,
        heartbeat_bc: ((w2[0] >> 16) & 0xFFF) as u16,
        trigger_type: w2[1],
        detector_field: (w3[0] & 0xFFFF) as u16,
        par: (w3[0] >> 16) as u16,
        stop_bit: (w3[1] & 0xFF) as u8,
        pages_counter: ((w3[1] >> 8) & 0xFFFF) as u16,
    };

    tracing::trace!(
        memory_size = header.memory_size,
        packet_counter = header.packet_counter,
        trigger_orbit = header.trigger_orbit,
        trigger_bc = header.trigger_bc,
        "RDH"
    );

    Ok(header)
}

impl PageHeader {
    /// Serialize into the 64-byte on-wire layout
    pub fn to_bytes(&self) -> [u8; RDH_SIZE] {
        let words: [[u32; 4]; RDH_WORDS] = [
            [
                self.header_version as u32
                    | (self.header_size as u32) << 8
                    | (self.block_length as u32) << 16,
                self.fee_id as u32 | (self.priority as u32) << 16,
                self.offset_new_packet as u32 | (self.memory_size as u32) << 16,
                (self.packet_counter as u32) << 8
                    | (self.cru_id as u32 & 0xFFF) << 16
                    | (self.data_path_wrapper as u32 & 0xF) << 28,
            ],
            [self.trigger_orbit, self.heartbeat_orbit, 0, 0],
            [
                self.trigger_bc as u32 & 0xFFF | (self.heartbeat_bc as u32 & 0xFFF) << 16,
                self.trigger_type,
                0,
                0,
            ],
            [
                self.detector_field as u32 | (self.par as u32) << 16,
                self.stop_bit as u32 | (self.pages_counter as u32) << 8,
                0,
                0,
            ],
        ];

        let mut bytes = [0u8; RDH_SIZE];
        for (i, word) in words.iter().flatten().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// A page that carries no payload beyond the header (closing RDH)
    pub fn is_empty_page(&self) -> bool {
        self.memory_size as usize <= RDH_SIZE
    }
}
