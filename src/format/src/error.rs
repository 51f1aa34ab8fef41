use std::io;

use thiserror::Error;

use crate::integrity::Section;
use crate::schema::DataType;

/// Structural problems of a schema declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no columns")]
    Empty,

    #[error("column at ordinal {ordinal} has an empty name")]
    EmptyName { ordinal: usize },

    #[error("duplicate column name '{0}'")]
    DuplicateName(String),

    #[error("column '{name}' has ordinal {ordinal}, expected {expected}")]
    InvalidOrdinal {
        name: String,
        ordinal: usize,
        expected: usize,
    },

    #[error("schema limit exceeded: {0}")]
    Limit(String),

    #[error("unknown data type tag {0}")]
    UnknownType(u8),

    #[error("schema parse error: {0}")]
    Parse(String),

    #[error("invalid {dtype} value '{text}' for column '{column}'")]
    InvalidValue {
        column: String,
        dtype: DataType,
        text: String,
    },
}

/// Errors of the block codec, both while packing records and while
/// validating encoded bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block holds at most {max} records, got {got}")]
    RecordCountExceeded { got: usize, max: usize },

    #[error("block has no records")]
    EmptyBlock,

    #[error("record has {got} fields, schema has {expected} columns")]
    ArityMismatch { expected: usize, got: usize },

    #[error("column '{column}' expects {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        got: &'static str,
    },

    #[error("column '{column}' is not nullable")]
    NullViolation { column: String },

    #[error(
        "column '{column}' slot {slot}: payload {offset}+{length} exceeds unsized section of {size} bytes"
    )]
    OffsetOutOfRange {
        column: String,
        slot: usize,
        offset: u32,
        length: u32,
        size: usize,
    },

    #[error("block truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("record {index} out of range, block holds {count}")]
    RecordOutOfRange { index: usize, count: usize },

    #[error("column {index} out of range, schema has {count}")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("column '{column}' slot {slot} is not valid UTF-8")]
    InvalidUtf8 { column: String, slot: usize },

    #[error("unsized section exceeds {max} bytes")]
    PayloadTooLarge { max: u64 },
}

/// Errors of the chunk codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("block {index} (offset {offset}, length {length}) is not 64-byte aligned and contiguous")]
    BlockAlignmentViolation {
        index: usize,
        offset: u32,
        length: u32,
    },

    #[error("block {index} holds {count} records but is not the last block of its chunk")]
    RecordCountViolation { index: usize, count: usize },

    #[error("block index truncated: need {need} bytes, got {got}")]
    TruncatedBlockIndex { need: u64, got: u64 },

    #[error("block data truncated: need {need} bytes, got {got}")]
    TruncatedData { need: u64, got: u64 },

    #[error("block {index} ends at {end}, past block data of {len} bytes")]
    BlockOutOfBounds { index: usize, end: u64, len: u32 },

    #[error("block {index} out of range, chunk holds {count}")]
    BlockOutOfRange { index: usize, count: usize },

    #[error("record {index} out of range, chunk holds {count}")]
    RecordOutOfRange { index: u64, count: u64 },

    #[error("chunk has no blocks")]
    Empty,

    #[error("chunk block data exceeds {max} bytes")]
    DataTooLarge { max: u64 },

    #[error("chunk is compressed but no compression codec is available")]
    MissingCompression,

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Errors of the file container.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("invalid magic {0:?}: not a kobuta file")]
    InvalidMagic([u8; 4]),

    #[error("file is version {version}, supported version is {supported}")]
    VersionUnsupported { version: u8, supported: u8 },

    #[error("checksum mismatch in {section}")]
    ChecksumMismatch { section: Section },

    #[error("record index {index} out of range, file holds {count}")]
    IndexOutOfRange { index: u64, count: u64 },

    #[error("{section} truncated: need {need} bytes, got {got}")]
    Truncated {
        section: Section,
        need: u64,
        got: u64,
    },

    #[error("corrupt metadata: {0}")]
    CorruptMetadata(String),

    #[error("corrupt chunk index: {0}")]
    CorruptIndex(String),

    #[error("no codec for compression id {0}")]
    UnknownCompression(u8),

    #[error("chunk schema does not match the file schema")]
    SchemaMismatch,

    #[error("chunk is compressed with codec {got}, file uses codec {expected}")]
    CompressionMismatch { expected: u8, got: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Error aggregates the per-layer errors so callers can use `?` across the
/// whole codec.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Chunk(ChunkError),

    #[error(transparent)]
    File(#[from] FileError),
}

/// Block errors raised through the chunk layer surface as `Error::Block`.
impl From<ChunkError> for Error {
    fn from(e: ChunkError) -> Self {
        match e {
            ChunkError::Block(e) => Error::Block(e),
            e => Error::Chunk(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::File(FileError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
