use bytes::Bytes;
use tracing::trace;

use crate::align_up;
use crate::block::{BlockBuilder, EncodedBlock};
use crate::chunk::{
    BlockIndexEntry, ChunkHeader, BLOCK_INDEX_ENTRY_SIZE, CHUNK_HEADER_SIZE, MAX_CHUNK_DATA_LEN,
};
use crate::compression::Compression;
use crate::error::{BlockError, ChunkError};
use crate::schema::SchemaRef;
use crate::value::Record;
use crate::{BLOCK_CAPACITY, DEFAULT_CHUNK_TARGET_SIZE};

/// EncodedChunk is a sealed chunk ready to be appended to a file.
#[derive(Clone, Debug)]
pub struct EncodedChunk {
    schema: SchemaRef,
    bytes: Bytes,
    record_count: u64,
    block_count: usize,
    raw_len: usize,
    /// Id of the codec the block data is compressed with, if any.
    compression_id: Option<u8>,
}

impl EncodedChunk {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// raw_len is the uncompressed size of the block data region.
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_id.is_some()
    }

    pub fn compression_id(&self) -> Option<u8> {
        self.compression_id
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// encode_chunk lays out already encoded blocks as one chunk. Every block but
/// the last must hold 64 records.
pub fn encode_chunk(
    blocks: &[EncodedBlock],
    schema: SchemaRef,
    compression: Option<&dyn Compression>,
) -> Result<EncodedChunk, ChunkError> {
    if blocks.is_empty() {
        return Err(ChunkError::Empty);
    }

    let mut data = Vec::with_capacity(blocks.iter().map(|b| b.bytes.len()).sum());
    let mut index = Vec::with_capacity(blocks.len());
    for (i, block) in blocks.iter().enumerate() {
        if block.record_count == 0 {
            return Err(BlockError::EmptyBlock.into());
        }
        if block.record_count > BLOCK_CAPACITY {
            return Err(BlockError::RecordCountExceeded {
                got: block.record_count,
                max: BLOCK_CAPACITY,
            }
            .into());
        }
        if block.record_count != BLOCK_CAPACITY && i + 1 != blocks.len() {
            return Err(ChunkError::RecordCountViolation {
                index: i,
                count: block.record_count,
            });
        }
        if block.bytes.len() % crate::ALIGNMENT != 0 {
            return Err(ChunkError::BlockAlignmentViolation {
                index: i,
                offset: data.len() as u32,
                length: block.bytes.len() as u32,
            });
        }

        index.push(BlockIndexEntry::new(
            data.len() as u32,
            block.bytes.len() as u32,
            block.record_count as u32,
        ));
        data.extend_from_slice(&block.bytes);
        if data.len() as u64 > MAX_CHUNK_DATA_LEN {
            return Err(ChunkError::DataTooLarge {
                max: MAX_CHUNK_DATA_LEN,
            });
        }
    }

    seal(schema, index, data, compression)
}

/// seal writes header, block index and (possibly compressed) block data.
fn seal(
    schema: SchemaRef,
    index: Vec<BlockIndexEntry>,
    data: Vec<u8>,
    compression: Option<&dyn Compression>,
) -> Result<EncodedChunk, ChunkError> {
    if data.len() as u64 > MAX_CHUNK_DATA_LEN {
        return Err(ChunkError::DataTooLarge {
            max: MAX_CHUNK_DATA_LEN,
        });
    }

    let raw_len = data.len();
    let (stored, compression_id) = match compression {
        Some(codec) => {
            let c = codec.compress(&data)?;
            // keep the raw bytes when compression does not pay off
            if c.len() < raw_len {
                (c, Some(codec.id()))
            } else {
                (data, None)
            }
        }
        None => (data, None),
    };
    let compressed = compression_id.is_some();

    let header = ChunkHeader {
        compressed,
        block_count: index.len() as u32,
        raw_len: raw_len as u32,
        stored_len: stored.len() as u32,
    };

    let data_offset = header.data_offset();
    let mut b = Vec::with_capacity(align_up(data_offset + stored.len()));
    header.append_to(&mut b);
    for entry in &index {
        entry.append_to(&mut b);
    }
    debug_assert_eq!(b.len(), CHUNK_HEADER_SIZE + index.len() * BLOCK_INDEX_ENTRY_SIZE);
    b.resize(data_offset, 0);
    b.extend_from_slice(&stored);
    b.resize(align_up(b.len()), 0);

    let record_count: u64 = index.iter().map(|e| e.record_count as u64).sum();

    trace!(
        blocks = index.len(),
        records = record_count,
        raw_len,
        stored_len = stored.len(),
        compressed,
        "sealed chunk"
    );

    Ok(EncodedChunk {
        schema,
        bytes: Bytes::from(b),
        record_count,
        block_count: index.len(),
        raw_len,
        compression_id,
    })
}

/// ChunkBuilder packs records into blocks of 64 and blocks into a chunk.
///
/// Full blocks are encoded as soon as they fill up, so `raw_size` tracks the
/// uncompressed block data produced so far.
#[derive(Debug)]
pub struct ChunkBuilder {
    schema: SchemaRef,
    target_size: usize,

    block: BlockBuilder,
    data: Vec<u8>,
    index: Vec<BlockIndexEntry>,
    sealed_records: u64,
    max_data_len: u64,
}

impl ChunkBuilder {
    pub fn new(schema: SchemaRef) -> Self {
        Self::with_target_size(schema, DEFAULT_CHUNK_TARGET_SIZE)
    }

    pub fn with_target_size(schema: SchemaRef, target_size: usize) -> Self {
        Self {
            block: BlockBuilder::new(schema.clone()),
            schema,
            target_size,
            data: Vec::new(),
            index: Vec::new(),
            sealed_records: 0,
            max_data_len: MAX_CHUNK_DATA_LEN,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// push validates and buffers `record`, encoding the pending block once
    /// it holds 64 records.
    pub fn push(&mut self, record: Record) -> Result<(), ChunkError> {
        self.block.push(record)?;
        if self.block.is_full() {
            self.seal_block()?;
        }
        Ok(())
    }

    /// seal_block encodes the pending block. Its records stay pending when
    /// the chunk would outgrow `max_data_len`.
    fn seal_block(&mut self) -> Result<(), ChunkError> {
        let offset = self.data.len();
        let n = self.block.encode_to(&mut self.data)?;
        if self.data.len() as u64 > self.max_data_len {
            self.data.truncate(offset);
            return Err(ChunkError::DataTooLarge {
                max: self.max_data_len,
            });
        }
        self.block.clear();

        self.index.push(BlockIndexEntry::new(
            offset as u32,
            (self.data.len() - offset) as u32,
            n as u32,
        ));
        self.sealed_records += n as u64;
        Ok(())
    }

    pub fn record_count(&self) -> u64 {
        self.sealed_records + self.block.len() as u64
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// raw_size is the size of the encoded blocks so far, excluding the
    /// pending partial block.
    pub fn raw_size(&self) -> usize {
        self.data.len()
    }

    /// is_full reports whether the chunk reached its target size on a block
    /// boundary, so sealing it keeps every block but the last at 64 records.
    pub fn is_full(&self) -> bool {
        self.block.is_empty() && self.data.len() >= self.target_size
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// finish seals the chunk and resets the builder for the next one.
    pub fn finish(
        &mut self,
        compression: Option<&dyn Compression>,
    ) -> Result<EncodedChunk, ChunkError> {
        if !self.block.is_empty() {
            self.seal_block()?;
        }
        if self.index.is_empty() {
            return Err(ChunkError::Empty);
        }

        let index = std::mem::take(&mut self.index);
        let data = std::mem::take(&mut self.data);
        self.sealed_records = 0;

        seal(self.schema.clone(), index, data, compression)
    }
}
