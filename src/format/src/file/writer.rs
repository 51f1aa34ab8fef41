use std::path::Path;
use std::sync::Arc;

use kobuta_storage::Writable;
use tracing::debug;

use crate::{align_up, ALIGNMENT};
use crate::chunk::{ChunkBuilder, EncodedChunk};
use crate::compression::{Compression, CUSTOM_COMPRESSION_ID_START};
use crate::error::{ChunkError, FileError, Result};
use crate::file::buffer::{DataBuffer, FileDataBuffer, MemoryDataBuffer};
use crate::file::index::{ChunkIndex, ChunkIndexEntry};
use crate::file::metadata::Metadata;
use crate::file::options::WriterOptions;
use crate::integrity;
use crate::schema::SchemaRef;
use crate::value::Record;

/// FileWriter writes a file in a single forward pass over an append-only
/// sink.
///
/// Records are packed into chunks as they arrive. Chunk bytes are held in a
/// [`DataBuffer`] until [`finish`](FileWriter::finish), which emits the
/// metadata, the chunk index and then the buffered data section.
pub struct FileWriter<W, B = MemoryDataBuffer> {
    schema: SchemaRef,
    sink: W,
    buffer: B,

    codec: Option<Arc<dyn Compression>>,
    builder: ChunkBuilder,

    /// Chunk offsets are relative to the data section until finish.
    entries: Vec<ChunkIndexEntry>,
    record_count: u64,
}

impl<W: Writable> FileWriter<W, MemoryDataBuffer> {
    /// new returns a writer that buffers the data section in memory.
    pub fn new(schema: SchemaRef, sink: W, options: WriterOptions) -> Result<Self> {
        Self::with_buffer(schema, sink, MemoryDataBuffer::new(), options)
    }
}

impl<W: Writable> FileWriter<W, FileDataBuffer> {
    /// with_disk_buffer returns a writer that spills the data section to a
    /// scratch file at `spill_path`, removed when the writer finishes.
    pub async fn with_disk_buffer(
        schema: SchemaRef,
        sink: W,
        spill_path: impl AsRef<Path>,
        options: WriterOptions,
    ) -> Result<Self> {
        let buffer = FileDataBuffer::create(spill_path).await?;
        Self::with_buffer(schema, sink, buffer, options)
    }
}

impl<W: Writable, B: DataBuffer> FileWriter<W, B> {
    pub fn with_buffer(
        schema: SchemaRef,
        sink: W,
        buffer: B,
        options: WriterOptions,
    ) -> Result<Self> {
        let codec = options.resolve_codec();
        if let Some(codec) = &options.codec {
            if codec.id() < CUSTOM_COMPRESSION_ID_START {
                return Err(FileError::UnknownCompression(codec.id()).into());
            }
        }

        Ok(Self {
            builder: ChunkBuilder::with_target_size(schema.clone(), options.chunk_target_size),
            schema,
            sink,
            buffer,
            codec,
            entries: Vec::new(),
            record_count: 0,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// record_count returns the number of records written so far, pending
    /// ones included.
    pub fn record_count(&self) -> u64 {
        self.record_count + self.builder.record_count()
    }

    /// chunk_count returns the number of sealed chunks.
    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    /// write validates and appends one record. A rejected record is not
    /// written and the writer stays usable.
    pub async fn write(&mut self, record: Record) -> Result<()> {
        self.builder.push(record)?;
        if self.builder.is_full() {
            self.seal_chunk().await?;
        }
        Ok(())
    }

    pub async fn write_all<I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.write(record).await?;
        }
        Ok(())
    }

    /// write_chunk appends a chunk encoded elsewhere, e.g. on a worker
    /// thread. A compressed chunk must use the writer's codec. Pending
    /// records are sealed into their own chunk first so record order is
    /// preserved.
    pub async fn write_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        if **chunk.schema() != *self.schema {
            return Err(FileError::SchemaMismatch.into());
        }
        if let Some(got) = chunk.compression_id() {
            match &self.codec {
                None => return Err(ChunkError::MissingCompression.into()),
                Some(codec) if codec.id() != got => {
                    return Err(FileError::CompressionMismatch {
                        expected: codec.id(),
                        got,
                    }
                    .into())
                }
                Some(_) => {}
            }
        }

        if !self.builder.is_empty() {
            self.seal_chunk().await?;
        }
        self.append_chunk(chunk).await
    }

    async fn seal_chunk(&mut self) -> Result<()> {
        let chunk = self.builder.finish(self.codec.as_deref())?;
        self.append_chunk(chunk).await
    }

    async fn append_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        let record_count = u32::try_from(chunk.record_count()).map_err(|_| {
            FileError::CorruptIndex(format!("chunk of {} records", chunk.record_count()))
        })?;
        let length = u32::try_from(chunk.len())
            .map_err(|_| FileError::CorruptIndex(format!("chunk of {} bytes", chunk.len())))?;

        let entry = ChunkIndexEntry {
            offset: self.buffer.len(),
            length,
            record_count,
            compressed: chunk.is_compressed(),
            checksum: integrity::checksum(chunk.bytes()),
        };
        self.buffer.append(chunk.bytes()).await?;

        self.entries.push(entry);
        self.record_count += chunk.record_count();
        Ok(())
    }

    /// finish seals pending records, writes metadata, chunk index and data
    /// to the sink, syncs it and hands it back.
    pub async fn finish(mut self) -> Result<W> {
        if !self.builder.is_empty() {
            self.seal_chunk().await?;
        }

        let chunk_count = self.entries.len();
        let metadata = Metadata {
            schema: self.schema.clone(),
            compression_id: self.codec.as_ref().map(|c| c.id()).unwrap_or_default(),
            record_count: self.record_count,
            chunk_count: chunk_count as u32,
        }
        .marshal_binary();

        let data_start = align_up(metadata.len() + ChunkIndex::encoded_len(chunk_count));
        let mut entries = std::mem::take(&mut self.entries);
        for entry in entries.iter_mut() {
            entry.offset += data_start as u64;
        }
        let index = ChunkIndex::new(entries).marshal_binary();

        let Self {
            mut sink,
            mut buffer,
            record_count,
            ..
        } = self;

        sink.append(&metadata).await?;
        sink.append(&index).await?;
        let padding = data_start - metadata.len() - index.len();
        if padding > 0 {
            sink.append(&[0_u8; ALIGNMENT][..padding]).await?;
        }
        let data_len = buffer.copy_to(&mut sink).await?;
        sink.flush().await?;
        sink.sync().await?;
        buffer.close().await?;

        debug!(
            records = record_count,
            chunks = chunk_count,
            size = data_start as u64 + data_len,
            "finished file"
        );

        Ok(sink)
    }
}
