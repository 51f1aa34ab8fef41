use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use kobuta_storage::RandomAccessFile;
use tokio::io::AsyncRead;
use tracing::debug;

use crate::align_up;
use crate::chunk::ChunkView;
use crate::compression::{Compression, CompressionType};
use crate::error::{FileError, Result};
use crate::file::cursor::{ByteCursor, RandomAccessCursor, RecordIterator, StreamCursor};
use crate::file::index::ChunkIndex;
use crate::file::metadata::Metadata;
use crate::file::options::ReadOptions;
use crate::file::METADATA_PREFIX_SIZE;
use crate::integrity::{self, Section};
use crate::schema::SchemaRef;
use crate::value::Record;

/// FileContext is everything learned from opening a file: metadata, chunk
/// index and the codec for its chunks. It is immutable and shared by every
/// cursor over the file.
#[derive(Debug)]
pub(crate) struct FileContext {
    pub metadata: Metadata,
    pub index: ChunkIndex,
    pub codec: Option<Arc<dyn Compression>>,
    pub options: ReadOptions,
}

impl FileContext {
    /// load validates magic, version, metadata checksum, schema, chunk index
    /// checksum and chunk index consistency, in that order.
    pub async fn load<C: ByteCursor>(cursor: &mut C, options: ReadOptions) -> Result<Self> {
        let source_len = cursor.len_hint();

        let prefix_len = match source_len {
            Some(len) if len < METADATA_PREFIX_SIZE as u64 => len as usize,
            _ => METADATA_PREFIX_SIZE,
        };
        let prefix = cursor.read_at(Section::Metadata, 0, prefix_len).await?;
        let metadata_len = Metadata::peek_len(&prefix, source_len)?;

        let rest = cursor
            .read_at(
                Section::Metadata,
                METADATA_PREFIX_SIZE as u64,
                metadata_len - METADATA_PREFIX_SIZE,
            )
            .await?;
        let mut b = BytesMut::with_capacity(metadata_len);
        b.extend_from_slice(&prefix);
        b.extend_from_slice(&rest);
        let metadata = Metadata::unmarshal_binary(&b)?;

        let chunk_count = metadata.chunk_count as usize;
        let index_len = ChunkIndex::encoded_len(chunk_count);
        let index_bytes = cursor
            .read_at(Section::ChunkIndex, metadata_len as u64, index_len)
            .await?;
        let index = ChunkIndex::unmarshal_binary(&index_bytes, chunk_count)?;

        let data_start = align_up(metadata_len + index_len) as u64;
        index.validate(data_start, source_len, metadata.record_count)?;

        let codec = resolve_codec(metadata.compression_id, &options)?;

        debug!(
            records = metadata.record_count,
            chunks = chunk_count,
            columns = metadata.schema.len(),
            compression = metadata.compression_id,
            "opened file"
        );

        Ok(Self {
            metadata,
            index,
            codec,
            options,
        })
    }

    pub async fn read_chunk<C: ByteCursor>(
        &self,
        cursor: &mut C,
        i: usize,
    ) -> Result<ChunkView> {
        let entry = self.index.get(i).ok_or(FileError::IndexOutOfRange {
            index: i as u64,
            count: self.index.len() as u64,
        })?;

        let bytes = cursor
            .read_at(Section::Chunk(i), entry.offset, entry.length as usize)
            .await?;
        self.decode_chunk(i, bytes)
    }

    /// decode_chunk verifies chunk `i`'s checksum, if enabled, decodes it and
    /// checks it against its index entry.
    pub fn decode_chunk(&self, i: usize, bytes: Bytes) -> Result<ChunkView> {
        let entry = self.index.get(i).ok_or(FileError::IndexOutOfRange {
            index: i as u64,
            count: self.index.len() as u64,
        })?;

        if self.options.verify_chunk_checksums {
            integrity::verify_checksum(Section::Chunk(i), &bytes, entry.checksum)?;
        }

        let schema = self.metadata.schema.clone();
        let view = ChunkView::decode(bytes, schema, self.codec.as_deref())?;
        if view.record_count() != entry.record_count as u64 {
            return Err(FileError::CorruptIndex(format!(
                "chunk {} holds {} records, index says {}",
                i,
                view.record_count(),
                entry.record_count
            ))
            .into());
        }
        if view.is_compressed() != entry.compressed {
            return Err(FileError::CorruptIndex(format!(
                "chunk {} compression flag disagrees with the index",
                i
            ))
            .into());
        }
        Ok(view)
    }
}

/// resolve_codec picks the codec for a file's compression id: a caller
/// supplied codec with that id first, then the built-in ones.
fn resolve_codec(
    id: u8,
    options: &ReadOptions,
) -> std::result::Result<Option<Arc<dyn Compression>>, FileError> {
    if id == CompressionType::None.id() {
        return Ok(None);
    }
    if let Some(codec) = options.codec.as_ref().filter(|c| c.id() == id) {
        return Ok(Some(codec.clone()));
    }
    CompressionType::from_id(id)
        .and_then(|t| t.codec())
        .map(Some)
        .ok_or(FileError::UnknownCompression(id))
}

/// FileReader gives random and sequential access to a file on a
/// [`RandomAccessFile`]. Clones share the source and the opened metadata.
pub struct FileReader<F> {
    source: Arc<F>,
    ctx: Arc<FileContext>,
}

impl<F> Clone for FileReader<F> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<F: RandomAccessFile> FileReader<F> {
    pub async fn open(source: F) -> Result<Self> {
        Self::open_with_options(source, ReadOptions::default()).await
    }

    pub async fn open_with_options(source: F, options: ReadOptions) -> Result<Self> {
        let source = Arc::new(source);
        let mut cursor = RandomAccessCursor::new(source.clone());
        let ctx = FileContext::load(&mut cursor, options).await?;

        Ok(Self {
            source,
            ctx: Arc::new(ctx),
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.ctx.metadata.schema
    }

    pub fn metadata(&self) -> &Metadata {
        &self.ctx.metadata
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.ctx.index
    }

    pub fn record_count(&self) -> u64 {
        self.ctx.metadata.record_count
    }

    pub fn chunk_count(&self) -> usize {
        self.ctx.index.len()
    }

    /// read_chunk reads and decodes chunk `i` on its own.
    pub async fn read_chunk(&self, i: usize) -> Result<ChunkView> {
        let mut cursor = RandomAccessCursor::new(self.source.clone());
        self.ctx.read_chunk(&mut cursor, i).await
    }

    /// read_record returns the record at `global` index, locating its chunk
    /// by binary search over the chunk index.
    pub async fn read_record(&self, global: u64) -> Result<Record> {
        let (chunk, local) = self
            .ctx
            .index
            .locate(global)
            .ok_or(FileError::IndexOutOfRange {
                index: global,
                count: self.record_count(),
            })?;

        let view = self.read_chunk(chunk).await?;
        Ok(view.record(local)?)
    }

    /// read_sequential returns a forward-only iterator over all records.
    pub fn read_sequential(&self) -> RecordIterator<RandomAccessCursor<F>> {
        RecordIterator::new(
            self.ctx.clone(),
            RandomAccessCursor::new(self.source.clone()),
        )
    }

    pub fn records(&self) -> RecordIterator<RandomAccessCursor<F>> {
        self.read_sequential()
    }

    /// close releases the source once no clone of this reader is left.
    pub async fn close(self) -> Result<()> {
        if let Ok(source) = Arc::try_unwrap(self.source) {
            source.close().await?;
        }
        Ok(())
    }
}

/// FileStreamReader reads a file from a forward-only source. Metadata and
/// the chunk index are read on open; records are read in one pass.
pub struct FileStreamReader<R> {
    ctx: Arc<FileContext>,
    cursor: StreamCursor<R>,
}

impl<R: AsyncRead + Unpin + Send> FileStreamReader<R> {
    pub async fn open(reader: R) -> Result<Self> {
        Self::open_with_options(reader, ReadOptions::default()).await
    }

    pub async fn open_with_options(reader: R, options: ReadOptions) -> Result<Self> {
        let mut cursor = StreamCursor::new(reader);
        let ctx = FileContext::load(&mut cursor, options).await?;

        Ok(Self {
            ctx: Arc::new(ctx),
            cursor,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.ctx.metadata.schema
    }

    pub fn metadata(&self) -> &Metadata {
        &self.ctx.metadata
    }

    pub fn chunk_index(&self) -> &ChunkIndex {
        &self.ctx.index
    }

    pub fn record_count(&self) -> u64 {
        self.ctx.metadata.record_count
    }

    pub fn records(self) -> RecordIterator<StreamCursor<R>> {
        RecordIterator::new(self.ctx, self.cursor)
    }
}
