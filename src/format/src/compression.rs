//! Pluggable whole-region compression of a chunk's block data.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ChunkError;

/// Ids from this value upward are free for codecs supplied by the caller.
pub const CUSTOM_COMPRESSION_ID_START: u8 = 128;

/// Compression turns a chunk's block data into stored bytes and back.
pub trait Compression: Send + Sync + Debug {
    /// id is stored in the file metadata and identifies the codec on read.
    fn id(&self) -> u8;

    fn name(&self) -> &str;

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, ChunkError>;

    /// decompress must produce exactly `expected_len` bytes.
    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>, ChunkError>;
}

/// SnappyCompression uses the raw snappy format, without framing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnappyCompression;

impl Compression for SnappyCompression {
    fn id(&self) -> u8 {
        CompressionType::Snappy.id()
    }

    fn name(&self) -> &str {
        "snappy"
    }

    fn compress(&self, src: &[u8]) -> Result<Vec<u8>, ChunkError> {
        let mut encoder = snap::raw::Encoder::new();
        encoder
            .compress_vec(src)
            .map_err(|e| ChunkError::CompressionFailed(e.to_string()))
    }

    fn decompress(&self, src: &[u8], expected_len: usize) -> Result<Vec<u8>, ChunkError> {
        let len = snap::raw::decompress_len(src)
            .map_err(|e| ChunkError::DecompressionFailed(e.to_string()))?;
        if len != expected_len {
            return Err(ChunkError::DecompressionFailed(format!(
                "decompressed length {} != {}",
                len, expected_len
            )));
        }

        let mut decoder = snap::raw::Decoder::new();
        decoder
            .decompress_vec(src)
            .map_err(|e| ChunkError::DecompressionFailed(e.to_string()))
    }
}

/// CompressionType selects one of the built-in codecs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionType {
    #[default]
    None,
    Snappy,
}

impl CompressionType {
    pub fn id(&self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Snappy => 1,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            _ => None,
        }
    }

    /// codec returns the built-in implementation, `None` when uncompressed.
    pub fn codec(&self) -> Option<Arc<dyn Compression>> {
        match self {
            CompressionType::None => None,
            CompressionType::Snappy => Some(Arc::new(SnappyCompression)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};

    use crate::compression::{Compression, CompressionType, SnappyCompression};
    use crate::error::ChunkError;

    #[test]
    fn test_snappy() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut src = vec![0_u8; 4096];
        // low entropy so it compresses
        for b in src.iter_mut() {
            *b = rng.gen_range(0..4);
        }

        let codec = SnappyCompression;
        let compressed = codec.compress(&src).unwrap();
        assert!(compressed.len() < src.len());
        assert_eq!(codec.decompress(&compressed, src.len()).unwrap(), src);

        assert!(matches!(
            codec.decompress(&compressed, src.len() + 1),
            Err(ChunkError::DecompressionFailed(_))
        ));
        assert!(matches!(
            codec.decompress(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 10),
            Err(ChunkError::DecompressionFailed(_))
        ));
    }

    #[test]
    fn test_compression_type() {
        assert_eq!(CompressionType::default(), CompressionType::None);
        assert!(CompressionType::None.codec().is_none());

        let codec = CompressionType::Snappy.codec().unwrap();
        assert_eq!(codec.id(), 1);
        assert_eq!(codec.name(), "snappy");

        for t in [CompressionType::None, CompressionType::Snappy] {
            assert_eq!(CompressionType::from_id(t.id()), Some(t));
        }
        assert_eq!(CompressionType::from_id(200), None);
    }

    #[test]
    fn test_compression_type_serde() {
        let s = serde_json::to_string(&CompressionType::Snappy).unwrap();
        assert_eq!(s, "\"snappy\"");
        let t: CompressionType = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(t, CompressionType::None);
    }
}
