use std::fmt::{Display, Formatter};

use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::FileError;
use crate::file::{CHECKSUM_SIZE, CHUNK_INDEX_ENTRY_SIZE};
use crate::integrity::{self, Section};
use crate::ALIGNMENT;

const FLAG_COMPRESSED: u8 = 1;

/// ChunkIndexEntry locates one chunk in a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkIndexEntry {
    /// The absolute position in the file where this chunk is located.
    pub offset: u64,
    /// The size in bytes of the chunk in the file.
    pub length: u32,
    pub record_count: u32,
    pub compressed: bool,
    /// CRC32 of the chunk bytes.
    pub checksum: u32,
}

impl ChunkIndexEntry {
    pub fn append_to(&self, b: &mut Vec<u8>) {
        b.put_u64_le(self.offset);
        b.put_u32_le(self.length);
        b.put_u32_le(self.record_count);
        b.put_u8(if self.compressed { FLAG_COMPRESSED } else { 0 });
        b.put_bytes(0, 3);
        b.put_u32_le(self.checksum);
    }

    /// unmarshal_binary decodes an entry from the first 24 bytes of `b`.
    pub fn unmarshal_binary(b: &[u8]) -> Result<Self, FileError> {
        if b.len() < CHUNK_INDEX_ENTRY_SIZE {
            return Err(FileError::Truncated {
                section: Section::ChunkIndex,
                need: CHUNK_INDEX_ENTRY_SIZE as u64,
                got: b.len() as u64,
            });
        }

        Ok(Self {
            offset: LittleEndian::read_u64(&b[0..8]),
            length: LittleEndian::read_u32(&b[8..12]),
            record_count: LittleEndian::read_u32(&b[12..16]),
            compressed: b[16] & FLAG_COMPRESSED != 0,
            checksum: LittleEndian::read_u32(&b[20..24]),
        })
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length as u64
    }
}

impl Display for ChunkIndexEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ofs={} siz={} records={} compressed={} crc={:08x}",
            self.offset, self.length, self.record_count, self.compressed, self.checksum
        )
    }
}

/// ChunkIndex is the table of chunks with cumulative record counts, so a
/// global record index resolves to its chunk by binary search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkIndex {
    entries: Vec<ChunkIndexEntry>,
    /// first_record[i] is the global index of chunk i's first record; the
    /// last element is the total.
    first_record: Vec<u64>,
}

impl ChunkIndex {
    pub fn new(entries: Vec<ChunkIndexEntry>) -> Self {
        let mut first_record = Vec::with_capacity(entries.len() + 1);
        let mut total = 0_u64;
        first_record.push(total);
        for entry in &entries {
            total += entry.record_count as u64;
            first_record.push(total);
        }

        Self {
            entries,
            first_record,
        }
    }

    /// encoded_len is the size of an index of `count` entries with its
    /// checksum, without padding.
    pub fn encoded_len(count: usize) -> usize {
        count * CHUNK_INDEX_ENTRY_SIZE + CHECKSUM_SIZE
    }

    pub fn entries(&self) -> &[ChunkIndexEntry] {
        &self.entries
    }

    pub fn get(&self, i: usize) -> Option<&ChunkIndexEntry> {
        self.entries.get(i)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record_count(&self) -> u64 {
        self.first_record.last().copied().unwrap_or_default()
    }

    /// first_record returns the global index of the first record of chunk `i`.
    pub fn first_record(&self, i: usize) -> Option<u64> {
        if i < self.entries.len() {
            Some(self.first_record[i])
        } else {
            None
        }
    }

    /// locate maps a global record index to (chunk, chunk-local index).
    pub fn locate(&self, global: u64) -> Option<(usize, u64)> {
        if global >= self.record_count() {
            return None;
        }

        let chunk = self.first_record.partition_point(|first| *first <= global) - 1;
        Some((chunk, global - self.first_record[chunk]))
    }

    pub fn marshal_binary(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(Self::encoded_len(self.entries.len()));
        for entry in &self.entries {
            entry.append_to(&mut b);
        }
        let crc = integrity::checksum(&b);
        b.put_u32_le(crc);
        b
    }

    /// unmarshal_binary decodes `count` entries followed by their checksum.
    pub fn unmarshal_binary(b: &[u8], count: usize) -> Result<Self, FileError> {
        let len = Self::encoded_len(count);
        if b.len() < len {
            return Err(FileError::Truncated {
                section: Section::ChunkIndex,
                need: len as u64,
                got: b.len() as u64,
            });
        }

        let (body, crc) = b[..len].split_at(len - CHECKSUM_SIZE);
        integrity::verify_checksum(Section::ChunkIndex, body, LittleEndian::read_u32(crc))?;

        let entries = body
            .chunks_exact(CHUNK_INDEX_ENTRY_SIZE)
            .map(ChunkIndexEntry::unmarshal_binary)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(entries))
    }

    /// validate checks that chunks are aligned, ordered, non-overlapping, start
    /// at or after `data_start`, fit in a source of `source_len` bytes when
    /// known, and hold `record_count` records in total.
    pub fn validate(
        &self,
        data_start: u64,
        source_len: Option<u64>,
        record_count: u64,
    ) -> Result<(), FileError> {
        let mut next = data_start;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.offset % ALIGNMENT as u64 != 0 {
                return Err(FileError::CorruptIndex(format!(
                    "chunk {} at {} is not {}-byte aligned",
                    i, entry.offset, ALIGNMENT
                )));
            }
            if entry.offset < next {
                return Err(FileError::CorruptIndex(format!(
                    "chunk {} at {} overlaps the previous section ending at {}",
                    i, entry.offset, next
                )));
            }
            if entry.length == 0 || entry.record_count == 0 {
                return Err(FileError::CorruptIndex(format!("chunk {} is empty", i)));
            }
            if let Some(len) = source_len {
                if entry.end() > len {
                    return Err(FileError::Truncated {
                        section: Section::Chunk(i),
                        need: entry.end(),
                        got: len,
                    });
                }
            }
            next = entry.end();
        }

        if self.record_count() != record_count {
            return Err(FileError::CorruptIndex(format!(
                "chunks hold {} records, metadata says {}",
                self.record_count(),
                record_count
            )));
        }
        Ok(())
    }
}
