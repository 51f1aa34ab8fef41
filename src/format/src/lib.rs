//! Codec engine of the kobuta container: a binary format for strongly typed
//! tabular data that is cheap to stream and cheap to random-access.
//!
//! Records are packed bottom-up into [`block`]s of at most 64 rows, blocks
//! into [`chunk`]s under a block index, and chunks into a [`file`] under a
//! chunk index. Reading walks the same structures top-down.

#[macro_use]
extern crate async_trait;

#[macro_use]
pub mod value;

pub mod block;
pub mod chunk;
pub mod compression;
pub mod error;
pub mod file;
pub mod integrity;
pub mod schema;

pub use compression::{Compression, CompressionType, SnappyCompression};
pub use error::{BlockError, ChunkError, Error, FileError, Result, SchemaError};
pub use file::cursor::RecordIterator;
pub use file::index::{ChunkIndex, ChunkIndexEntry};
pub use file::metadata::Metadata;
pub use file::options::{ReadOptions, WriterOptions};
pub use file::reader::{FileReader, FileStreamReader};
pub use file::writer::FileWriter;
pub use schema::{Column, DataType, Schema, SchemaRef};
pub use value::{Record, Value, ValueRef};

/// Number of record slots in a block, and of values in a stripe.
pub const BLOCK_CAPACITY: usize = 64;

/// Blocks start on this boundary inside a chunk's data region, chunks start
/// on it inside a file.
pub const ALIGNMENT: usize = 64;

/// Uncompressed block-data size at which a chunk is sealed.
pub const DEFAULT_CHUNK_TARGET_SIZE: usize = 1024 * 1024;

/// align_up rounds `n` up to the next multiple of [`ALIGNMENT`].
pub(crate) const fn align_up(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}
