//! A kobuta file is composed of three sections: metadata, chunk index and data.
//!
//! ┌────────────────────────┬─────────────────────────┬──────────────────────────┐
//! │        Metadata        │       Chunk index       │           Data           │
//! │   N bytes, with CRC    │ N * 24 bytes, CRC, pad  │  chunks, each 64-aligned │
//! └────────────────────────┴─────────────────────────┴──────────────────────────┘
//!
//! Metadata starts with a fixed prefix identifying the file, followed by the
//! counts and the schema. A CRC32 of every preceding metadata byte closes it.
//!
//! ┌───────────────────────────────────────────────────────────────────────────────┐
//! │                                   Metadata                                    │
//! ├─────────┬─────────┬─────────────┬──────────┬──────────┬─────────┬─────────────┤
//! │  Magic  │ Version │ Compression │ Reserved │ Meta len │ Records │   Chunks    │
//! │ 4 bytes │ 1 byte  │   1 byte    │ 2 bytes  │ 4 bytes  │ 8 bytes │   4 bytes   │
//! ├─────────┴───┬─────┴──────┬──────┴───┬──────┴──────────┴─┬───────┴─┬───────────┤
//! │   Columns   │  Ordinal   │   Type   │ Flags │ Name len  │  Name   │    CRC    │
//! │   2 bytes   │  2 bytes   │  1 byte  │1 byte │  2 bytes  │ N bytes │  4 bytes  │
//! └─────────────┴────────────┴──────────┴───────┴───────────┴─────────┴───────────┘
//!
//! The chunk index holds one entry per chunk, then a CRC32 of the entries.
//! Zero padding follows so the data section starts on a 64-byte boundary.
//!
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                            Chunk entry                            │
//! ├──────────┬──────────┬──────────┬─────────┬──────────┬─────────────┤
//! │  Offset  │  Length  │ Records  │  Flags  │ Reserved │  Chunk CRC  │
//! │ 8 bytes  │ 4 bytes  │ 4 bytes  │ 1 byte  │ 3 bytes  │   4 bytes   │
//! └──────────┴──────────┴──────────┴─────────┴──────────┴─────────────┘
//!
//! Chunk offsets are absolute. All integers are little-endian.

pub mod buffer;
pub mod cursor;
pub mod index;
pub mod metadata;
pub mod options;
pub mod reader;
pub mod writer;

/// METADATA_PREFIX_SIZE covers magic, version, compression, reserved and
/// the metadata length.
pub const METADATA_PREFIX_SIZE: usize = 12;

/// METADATA_FIXED_SIZE is the metadata size before the column entries.
pub const METADATA_FIXED_SIZE: usize = METADATA_PREFIX_SIZE + 8 + 4 + 2;

/// COLUMN_ENTRY_FIXED_SIZE is the size of a column entry without its name.
pub const COLUMN_ENTRY_FIXED_SIZE: usize = 6;

pub const CHECKSUM_SIZE: usize = 4;

/// CHUNK_INDEX_ENTRY_SIZE is the size of one chunk index entry.
pub const CHUNK_INDEX_ENTRY_SIZE: usize = 24;

/// Smallest well-formed metadata: one column with a one byte name.
pub const MIN_METADATA_SIZE: usize =
    METADATA_FIXED_SIZE + COLUMN_ENTRY_FIXED_SIZE + 1 + CHECKSUM_SIZE;
