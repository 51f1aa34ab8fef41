//! A chunk groups blocks under a block index. The block data region may be
//! compressed as one unit.
//!
//! ┌────────────────────────────────────────┬────────────────────────┬─────┬─────────────┬─────┐
//! │                 Header                 │      Block index       │ pad │ Block data  │ pad │
//! │                16 bytes                │  N * 12 bytes          │ 64  │ stored len  │ 64  │
//! └────────────────────────────────────────┴────────────────────────┴─────┴─────────────┴─────┘
//!
//! ┌────────────────────────────────────────────────────────────┐
//! │                           Header                           │
//! ├──────────┬──────────┬──────────────┬───────────┬───────────┤
//! │  Flags   │ Reserved │ Block count  │  Raw len  │ Stored len│
//! │  1 byte  │ 3 bytes  │   4 bytes    │  4 bytes  │  4 bytes  │
//! └──────────┴──────────┴──────────────┴───────────┴───────────┘
//!
//! ┌──────────────────────────────────────┐
//! │             Block entry              │
//! ├────────────┬────────────┬────────────┤
//! │   Offset   │   Length   │   Count    │
//! │  4 bytes   │  4 bytes   │  4 bytes   │
//! └────────────┴────────────┴────────────┘
//!
//! Block offsets are relative to the decompressed block data region. Every
//! block but the last holds exactly 64 records, so a record's block is its
//! chunk-local index divided by 64.

use std::fmt::{Display, Formatter};

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::ChunkError;

pub mod decoder;
pub mod encoder;

pub use decoder::{ChunkRecords, ChunkView};
pub use encoder::{encode_chunk, ChunkBuilder, EncodedChunk};

/// CHUNK_HEADER_SIZE is the size of the fixed chunk header.
pub const CHUNK_HEADER_SIZE: usize = 16;

/// BLOCK_INDEX_ENTRY_SIZE is the size of one block index entry.
pub const BLOCK_INDEX_ENTRY_SIZE: usize = 12;

/// FLAG_COMPRESSED marks a compressed block data region.
pub const FLAG_COMPRESSED: u8 = 1;

/// Largest block data region a chunk can address.
pub const MAX_CHUNK_DATA_LEN: u64 = u32::MAX as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkHeader {
    pub compressed: bool,
    pub block_count: u32,
    pub raw_len: u32,
    pub stored_len: u32,
}

impl ChunkHeader {
    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_u8(if self.compressed { FLAG_COMPRESSED } else { 0 });
        b.put_bytes(0, 3);
        b.put_u32_le(self.block_count);
        b.put_u32_le(self.raw_len);
        b.put_u32_le(self.stored_len);
    }

    pub fn unmarshal_binary(b: &[u8]) -> Result<Self, ChunkError> {
        if b.len() < CHUNK_HEADER_SIZE {
            return Err(ChunkError::TruncatedBlockIndex {
                need: CHUNK_HEADER_SIZE as u64,
                got: b.len() as u64,
            });
        }

        Ok(Self {
            compressed: b[0] & FLAG_COMPRESSED != 0,
            block_count: LittleEndian::read_u32(&b[4..8]),
            raw_len: LittleEndian::read_u32(&b[8..12]),
            stored_len: LittleEndian::read_u32(&b[12..16]),
        })
    }

    /// data_offset is where the block data region starts inside the chunk.
    pub fn data_offset(&self) -> usize {
        crate::align_up(CHUNK_HEADER_SIZE + self.block_count as usize * BLOCK_INDEX_ENTRY_SIZE)
    }
}

/// BlockIndexEntry locates one block inside the block data region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub offset: u32,
    pub length: u32,
    pub record_count: u32,
}

impl BlockIndexEntry {
    pub fn new(offset: u32, length: u32, record_count: u32) -> Self {
        Self {
            offset,
            length,
            record_count,
        }
    }

    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_u32_le(self.offset);
        b.put_u32_le(self.length);
        b.put_u32_le(self.record_count);
    }

    pub fn unmarshal_binary(b: &[u8]) -> Result<Self, ChunkError> {
        if b.len() < BLOCK_INDEX_ENTRY_SIZE {
            return Err(ChunkError::TruncatedBlockIndex {
                need: BLOCK_INDEX_ENTRY_SIZE as u64,
                got: b.len() as u64,
            });
        }

        Ok(Self {
            offset: LittleEndian::read_u32(&b[0..4]),
            length: LittleEndian::read_u32(&b[4..8]),
            record_count: LittleEndian::read_u32(&b[8..12]),
        })
    }

    pub fn end(&self) -> u64 {
        self.offset as u64 + self.length as u64
    }
}

impl Display for BlockIndexEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ofs={} siz={} records={}",
            self.offset, self.length, self.record_count
        )
    }
}
