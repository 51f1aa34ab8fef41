//! Magic, version and checksum checks guarding a file's sections.

use std::fmt::{Display, Formatter};

use tracing::warn;

use crate::error::FileError;

/// MAGIC identifies a kobuta file.
pub const MAGIC: [u8; 4] = *b"KBTF";

/// VERSION is the only format version this crate reads and writes.
pub const VERSION: u8 = 1;

/// Section names the part of a file a check or a truncation refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Metadata,
    ChunkIndex,
    Chunk(usize),
}

impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Metadata => f.write_str("metadata"),
            Section::ChunkIndex => f.write_str("chunk index"),
            Section::Chunk(i) => write!(f, "chunk {}", i),
        }
    }
}

pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

pub fn check_magic(b: &[u8]) -> Result<(), FileError> {
    let mut magic = [0_u8; 4];
    let n = b.len().min(4);
    magic[..n].copy_from_slice(&b[..n]);

    if magic != MAGIC {
        return Err(FileError::InvalidMagic(magic));
    }
    Ok(())
}

pub fn check_version(version: u8) -> Result<(), FileError> {
    if version != VERSION {
        return Err(FileError::VersionUnsupported {
            version,
            supported: VERSION,
        });
    }
    Ok(())
}

/// verify_checksum compares the CRC32 of `data` against the stored value.
pub fn verify_checksum(section: Section, data: &[u8], expected: u32) -> Result<(), FileError> {
    let actual = checksum(data);
    if actual != expected {
        warn!(%section, expected, actual, "checksum mismatch");
        return Err(FileError::ChecksumMismatch { section });
    }
    Ok(())
}
