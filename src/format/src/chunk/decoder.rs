use bytes::Bytes;
use common_base::iterator::TryIterator;

use crate::block::BlockView;
use crate::chunk::{BlockIndexEntry, ChunkHeader, BLOCK_INDEX_ENTRY_SIZE, CHUNK_HEADER_SIZE};
use crate::compression::Compression;
use crate::error::{BlockError, ChunkError};
use crate::schema::SchemaRef;
use crate::value::Record;
use crate::{ALIGNMENT, BLOCK_CAPACITY};

/// ChunkView is a validated chunk with its block data region decompressed.
///
/// Uncompressed chunks share the caller's buffer; compressed chunks own the
/// decompressed region. Blocks are decoded lazily on access.
#[derive(Clone, Debug)]
pub struct ChunkView {
    schema: SchemaRef,
    data: Bytes,
    index: Vec<BlockIndexEntry>,
    record_count: u64,
    compressed: bool,
}

impl ChunkView {
    pub fn decode(
        bytes: Bytes,
        schema: SchemaRef,
        compression: Option<&dyn Compression>,
    ) -> Result<Self, ChunkError> {
        let header = ChunkHeader::unmarshal_binary(&bytes)?;
        if header.block_count == 0 {
            return Err(ChunkError::Empty);
        }

        let index_end = CHUNK_HEADER_SIZE as u64
            + header.block_count as u64 * BLOCK_INDEX_ENTRY_SIZE as u64;
        if (bytes.len() as u64) < index_end {
            return Err(ChunkError::TruncatedBlockIndex {
                need: index_end,
                got: bytes.len() as u64,
            });
        }

        let data_offset = header.data_offset();
        let data_end = data_offset as u64 + header.stored_len as u64;
        if (bytes.len() as u64) < data_end {
            return Err(ChunkError::TruncatedData {
                need: data_end,
                got: bytes.len() as u64,
            });
        }

        let stored = bytes.slice(data_offset..data_end as usize);
        let data = if header.compressed {
            let codec = compression.ok_or(ChunkError::MissingCompression)?;
            Bytes::from(codec.decompress(&stored, header.raw_len as usize)?)
        } else {
            if header.stored_len != header.raw_len {
                return Err(ChunkError::TruncatedData {
                    need: header.raw_len as u64,
                    got: header.stored_len as u64,
                });
            }
            stored
        };

        let index = (0..header.block_count as usize)
            .map(|i| {
                let at = CHUNK_HEADER_SIZE + i * BLOCK_INDEX_ENTRY_SIZE;
                BlockIndexEntry::unmarshal_binary(&bytes[at..])
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record_count = validate_index(&index, data.len())?;

        Ok(Self {
            schema,
            data,
            index,
            record_count,
            compressed: header.compressed,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn block_index(&self) -> &[BlockIndexEntry] {
        &self.index
    }

    /// block decodes block `i`. The block header must agree with the block
    /// index on the record count.
    pub fn block(&self, i: usize) -> Result<BlockView<'_>, ChunkError> {
        let entry = self.index.get(i).ok_or(ChunkError::BlockOutOfRange {
            index: i,
            count: self.index.len(),
        })?;

        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        let view = BlockView::decode(&self.data[start..end], &self.schema)?;
        if view.record_count() != entry.record_count as usize {
            return Err(ChunkError::RecordCountViolation {
                index: i,
                count: view.record_count(),
            });
        }
        Ok(view)
    }

    pub fn blocks(&self) -> impl Iterator<Item = Result<BlockView<'_>, ChunkError>> + '_ {
        (0..self.index.len()).map(move |i| self.block(i))
    }

    /// locate maps a chunk-local record index to (block, slot).
    pub fn locate(&self, local: u64) -> Result<(usize, usize), ChunkError> {
        if local >= self.record_count {
            return Err(ChunkError::RecordOutOfRange {
                index: local,
                count: self.record_count,
            });
        }
        let capacity = BLOCK_CAPACITY as u64;
        Ok(((local / capacity) as usize, (local % capacity) as usize))
    }

    pub fn record(&self, local: u64) -> Result<Record, ChunkError> {
        let (block, slot) = self.locate(local)?;
        Ok(self.block(block)?.record(slot)?)
    }

    pub fn records(&self) -> ChunkRecords<'_> {
        ChunkRecords {
            chunk: self,
            block: 0,
            pending: Vec::new(),
        }
    }
}

/// validate_index checks alignment, contiguity, bounds and per-block record
/// counts, returning the chunk's record total.
fn validate_index(index: &[BlockIndexEntry], data_len: usize) -> Result<u64, ChunkError> {
    let mut expected_offset = 0_u64;
    let mut record_count = 0_u64;

    for (i, entry) in index.iter().enumerate() {
        if entry.offset as u64 != expected_offset
            || entry.offset as usize % ALIGNMENT != 0
            || entry.length as usize % ALIGNMENT != 0
            || entry.length == 0
        {
            return Err(ChunkError::BlockAlignmentViolation {
                index: i,
                offset: entry.offset,
                length: entry.length,
            });
        }
        if entry.end() > data_len as u64 {
            return Err(ChunkError::BlockOutOfBounds {
                index: i,
                end: entry.end(),
                len: data_len as u32,
            });
        }

        let count = entry.record_count as usize;
        if count == 0 {
            return Err(BlockError::EmptyBlock.into());
        }
        if count > BLOCK_CAPACITY {
            return Err(BlockError::RecordCountExceeded {
                got: count,
                max: BLOCK_CAPACITY,
            }
            .into());
        }
        if count != BLOCK_CAPACITY && i + 1 != index.len() {
            return Err(ChunkError::RecordCountViolation { index: i, count });
        }

        expected_offset = entry.end();
        record_count += count as u64;
    }

    Ok(record_count)
}

/// ChunkRecords yields the records of a chunk one block at a time. A block
/// that fails to decode yields its error once; the next call continues with
/// the following block.
pub struct ChunkRecords<'a> {
    chunk: &'a ChunkView,
    block: usize,
    /// Records of the current block, reversed so `pop` yields slot order.
    pending: Vec<Record>,
}

impl<'a> TryIterator for ChunkRecords<'a> {
    type Item = Record;
    type Error = ChunkError;

    fn try_next(&mut self) -> Result<Option<Record>, ChunkError> {
        loop {
            if let Some(record) = self.pending.pop() {
                return Ok(Some(record));
            }
            if self.block >= self.chunk.block_count() {
                return Ok(None);
            }

            let block = self.block;
            self.block += 1;
            let view = self.chunk.block(block)?;
            self.pending = view.records().collect();
            self.pending.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};
    use bytes::Bytes;
    use common_base::iterator::TryIterator;

    use crate::chunk::decoder::ChunkView;
    use crate::chunk::encoder::ChunkBuilder;
    use crate::chunk::{BLOCK_INDEX_ENTRY_SIZE, CHUNK_HEADER_SIZE};
    use crate::compression::SnappyCompression;
    use crate::error::ChunkError;
    use crate::schema::{Schema, SchemaRef};
    use crate::value::Record;

    fn people() -> SchemaRef {
        Schema::parse("id: Int32, name: String, active: Bool")
            .unwrap()
            .into_ref()
    }

    fn people_records(n: i32) -> Vec<Record> {
        (0..n)
            .map(|i| record![i, format!("person {}", i), i % 5 == 0])
            .collect()
    }

    fn build(records: &[Record], compressed: bool) -> Bytes {
        let mut builder = ChunkBuilder::new(people());
        for r in records {
            builder.push(r.clone()).unwrap();
        }
        let codec = SnappyCompression;
        let compression = if compressed {
            Some(&codec as &dyn crate::compression::Compression)
        } else {
            None
        };
        builder.finish(compression).unwrap().into_bytes()
    }

    #[test]
    fn test_decode_130_records() {
        let records = people_records(130);
        let view = ChunkView::decode(build(&records, false), people(), None).unwrap();

        assert_eq!(view.record_count(), 130);
        assert_eq!(view.block_count(), 3);
        let counts: Vec<u32> = view.block_index().iter().map(|e| e.record_count).collect();
        assert_eq!(counts, vec![64, 64, 2]);
        for entry in view.block_index() {
            assert_eq!(entry.offset % 64, 0);
        }

        assert_eq!(view.locate(129).unwrap(), (2, 1));
        assert_eq!(view.record(129).unwrap(), records[129]);
        assert_eq!(view.record(64).unwrap(), records[64]);
        assert!(matches!(
            view.record(130),
            Err(ChunkError::RecordOutOfRange {
                index: 130,
                count: 130
            })
        ));

        assert_eq!(view.records().try_collect().unwrap(), records);
        assert_eq!(view.blocks().count(), 3);
    }

    #[test]
    fn test_decode_compressed() {
        let records = people_records(200);
        let bytes = build(&records, true);
        assert_eq!(bytes[0], 1);

        let view = ChunkView::decode(bytes.clone(), people(), Some(&SnappyCompression)).unwrap();
        assert!(view.is_compressed());
        assert_eq!(view.records().try_collect().unwrap(), records);

        assert!(matches!(
            ChunkView::decode(bytes, people(), None),
            Err(ChunkError::MissingCompression)
        ));
    }

    #[test]
    fn test_decode_rejects_bad_index() {
        let bytes = build(&people_records(130), false);

        // second block no longer starts where the first ends
        let mut corrupt = bytes.to_vec();
        let at = CHUNK_HEADER_SIZE + BLOCK_INDEX_ENTRY_SIZE;
        let offset = LittleEndian::read_u32(&corrupt[at..]);
        LittleEndian::write_u32(&mut corrupt[at..], offset + 64);
        assert!(matches!(
            ChunkView::decode(Bytes::from(corrupt), people(), None),
            Err(ChunkError::BlockAlignmentViolation { index: 1, .. })
        ));

        // first block claims a partial count
        let mut corrupt = bytes.to_vec();
        LittleEndian::write_u32(&mut corrupt[CHUNK_HEADER_SIZE + 8..], 10);
        assert!(matches!(
            ChunkView::decode(Bytes::from(corrupt), people(), None),
            Err(ChunkError::RecordCountViolation { index: 0, count: 10 })
        ));

        // block count larger than the index
        let mut corrupt = bytes.to_vec();
        LittleEndian::write_u32(&mut corrupt[4..8], 1000);
        assert!(matches!(
            ChunkView::decode(Bytes::from(corrupt), people(), None),
            Err(ChunkError::TruncatedBlockIndex { .. })
        ));

        assert!(matches!(
            ChunkView::decode(bytes.slice(..bytes.len() - 128), people(), None),
            Err(ChunkError::TruncatedData { .. })
        ));
    }

    #[test]
    fn test_block_header_must_match_index() {
        let bytes = build(&people_records(10), false);
        let mut corrupt = bytes.to_vec();

        // block header count lives at the start of the data region
        LittleEndian::write_u16(&mut corrupt[64..66], 9);
        let view = ChunkView::decode(Bytes::from(corrupt), people(), None).unwrap();
        assert!(matches!(
            view.block(0),
            Err(ChunkError::RecordCountViolation { index: 0, count: 9 })
        ));
        assert!(view.records().try_next().is_err());
        assert!(matches!(
            view.block(1),
            Err(ChunkError::BlockOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn test_records_skip_a_failed_block() {
        let records = people_records(130);
        let mut corrupt = build(&records, false).to_vec();
        LittleEndian::write_u16(&mut corrupt[64..66], 9);
        let view = ChunkView::decode(Bytes::from(corrupt), people(), None).unwrap();

        let mut it = view.records();
        assert!(matches!(
            it.try_next(),
            Err(ChunkError::RecordCountViolation { index: 0, count: 9 })
        ));
        for record in &records[64..] {
            assert_eq!(it.try_next().unwrap().as_ref(), Some(record));
        }
        assert_eq!(it.try_next().unwrap(), None);
    }
}
