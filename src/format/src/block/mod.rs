//! A block packs up to 64 records. Fixed width values are stored in
//! stripes of 64 slots, one stripe per column in ordinal order; variable
//! width values live in an unsized arena referenced from their stripe.
//!
//! ┌─────────────────────────────┬──────────────────────────────┬──────────────┬───────────┐
//! │           Header            │        Sized section         │   Unsized    │  Padding  │
//! │           8 bytes           │   sum of column stripes      │  ulen bytes  │ to 64 B   │
//! └─────────────────────────────┴──────────────────────────────┴──────────────┴───────────┘
//!
//! ┌────────────────────────────────┐
//! │             Header             │
//! ├──────────┬──────────┬──────────┤
//! │  Count   │ Reserved │   Ulen   │
//! │ 2 bytes  │ 2 bytes  │ 4 bytes  │
//! └──────────┴──────────┴──────────┘
//!
//! A stripe holds 64 slots whatever the record count; slots past the count
//! are zero. Nullable columns prefix their stripe with a validity word.
//!
//! ┌───────────────────┬────────────────────────────────────────────┐
//! │ Validity (opt.)   │                 64 slots                   │
//! │ 8 bytes           │ fixed: value │ variable: offset u32, len u32│
//! └───────────────────┴────────────────────────────────────────────┘
//!
//! Arena offsets are relative to the start of the unsized section, so a
//! block can be moved as raw bytes. All integers are little-endian.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::BlockError;
use crate::BLOCK_CAPACITY;

pub mod decoder;
pub mod encoder;

pub use decoder::BlockView;
pub use encoder::{encode_block, BlockBuilder, EncodedBlock};

/// BLOCK_HEADER_SIZE is the size of the header preceding the sized section.
pub const BLOCK_HEADER_SIZE: usize = 8;

/// VALIDITY_SIZE is the size of the validity word of a nullable stripe.
pub const VALIDITY_SIZE: usize = 8;

/// VAR_SLOT_SIZE is the size of an (offset, length) slot of a variable width stripe.
pub const VAR_SLOT_SIZE: usize = 8;

/// Largest unsized section a block can address.
pub const MAX_UNSIZED_LEN: u64 = u32::MAX as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    pub record_count: usize,
    pub unsized_len: usize,
}

impl BlockHeader {
    pub fn write_to(&self, b: &mut [u8]) {
        LittleEndian::write_u16(&mut b[0..2], self.record_count as u16);
        LittleEndian::write_u16(&mut b[2..4], 0);
        LittleEndian::write_u32(&mut b[4..8], self.unsized_len as u32);
    }

    pub fn unmarshal_binary(b: &[u8]) -> Result<Self, BlockError> {
        if b.len() < BLOCK_HEADER_SIZE {
            return Err(BlockError::Truncated {
                need: BLOCK_HEADER_SIZE,
                got: b.len(),
            });
        }

        let record_count = LittleEndian::read_u16(&b[0..2]) as usize;
        let unsized_len = LittleEndian::read_u32(&b[4..8]) as usize;

        if record_count == 0 {
            return Err(BlockError::EmptyBlock);
        }
        if record_count > BLOCK_CAPACITY {
            return Err(BlockError::RecordCountExceeded {
                got: record_count,
                max: BLOCK_CAPACITY,
            });
        }

        Ok(Self {
            record_count,
            unsized_len,
        })
    }
}
