use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compression::{Compression, CompressionType};
use crate::DEFAULT_CHUNK_TARGET_SIZE;

/// WriterOptions configures how a [`FileWriter`](crate::FileWriter) seals
/// and compresses chunks.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    /// Uncompressed block data size at which a chunk is sealed.
    pub chunk_target_size: usize,
    pub compression: CompressionType,

    /// A caller supplied codec, overriding `compression`. Its id must be
    /// at least 128.
    #[serde(skip)]
    pub codec: Option<Arc<dyn Compression>>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_target_size: DEFAULT_CHUNK_TARGET_SIZE,
            compression: CompressionType::None,
            codec: None,
        }
    }
}

impl WriterOptions {
    pub fn with_chunk_target_size(mut self, chunk_target_size: usize) -> Self {
        self.chunk_target_size = chunk_target_size;
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Compression>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// resolve_codec returns the codec chunks are compressed with, if any.
    pub(crate) fn resolve_codec(&self) -> Option<Arc<dyn Compression>> {
        self.codec.clone().or_else(|| self.compression.codec())
    }
}

/// ReadOptions configures how a file is opened and its chunks verified.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Check each chunk's CRC32 before decoding it.
    pub verify_chunk_checksums: bool,

    /// Codec for files written with a caller supplied compression id.
    #[serde(skip)]
    pub codec: Option<Arc<dyn Compression>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_chunk_checksums: true,
            codec: None,
        }
    }
}

impl ReadOptions {
    pub fn with_verify_chunk_checksums(mut self, verify: bool) -> Self {
        self.verify_chunk_checksums = verify;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Compression>) -> Self {
        self.codec = Some(codec);
        self
    }
}
