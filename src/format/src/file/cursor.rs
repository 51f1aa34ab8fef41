//! Byte cursors over random-access and streaming sources, and the record
//! iterator both kinds of reader share.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use common_base::iterator::AsyncIterator;
use kobuta_storage::RandomAccessFile;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::chunk::ChunkView;
use crate::error::{Error, FileError};
use crate::file::reader::FileContext;
use crate::integrity::Section;
use crate::value::Record;

const INITIAL_READ_CAPACITY: usize = 64 * 1024;

/// ByteCursor reads sections of a file by absolute offset.
#[async_trait]
pub trait ByteCursor: Send {
    /// read_at returns exactly `len` bytes at `offset`, or `FileError::Truncated`
    /// naming `section` when the source ends first.
    async fn read_at(&mut self, section: Section, offset: u64, len: usize)
        -> Result<Bytes, FileError>;

    /// len_hint returns the source length when it is known up front.
    fn len_hint(&self) -> Option<u64>;
}

/// RandomAccessCursor reads at any offset of a shared source.
pub struct RandomAccessCursor<F> {
    source: Arc<F>,
}

impl<F: RandomAccessFile> RandomAccessCursor<F> {
    pub fn new(source: Arc<F>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<F: RandomAccessFile> ByteCursor for RandomAccessCursor<F> {
    async fn read_at(
        &mut self,
        section: Section,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, FileError> {
        let source_len = self.source.len();
        let need = offset.saturating_add(len as u64);
        if need > source_len {
            return Err(FileError::Truncated {
                section,
                need,
                got: source_len,
            });
        }

        Ok(self.source.read_bytes(offset, len).await?)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.source.len())
    }
}

/// StreamCursor reads a forward-only source. Offsets must not go backwards;
/// gaps between sections are skipped.
pub struct StreamCursor<R> {
    reader: R,
    pos: u64,
}

impl<R: AsyncRead + Unpin + Send> StreamCursor<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        let mut n = 0;
        while n < buf.len() {
            let m = self.reader.read(&mut buf[n..]).await?;
            if m == 0 {
                break;
            }
            n += m;
        }
        self.pos += n as u64;
        Ok(n)
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ByteCursor for StreamCursor<R> {
    async fn read_at(
        &mut self,
        section: Section,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, FileError> {
        if offset < self.pos {
            return Err(FileError::CorruptIndex(format!(
                "{} at {} is behind stream position {}",
                section, offset, self.pos
            )));
        }

        let need = offset.saturating_add(len as u64);
        let mut skip = offset - self.pos;
        let mut scratch = [0_u8; 512];
        while skip > 0 {
            let n = (skip as usize).min(scratch.len());
            let got = self.fill(&mut scratch[..n]).await?;
            if got < n {
                return Err(FileError::Truncated {
                    section,
                    need,
                    got: self.pos,
                });
            }
            skip -= got as u64;
        }

        // grow with the bytes actually read, a corrupt length must not
        // allocate up front
        let mut buf = Vec::with_capacity(len.min(INITIAL_READ_CAPACITY));
        let got = (&mut self.reader).take(len as u64).read_to_end(&mut buf).await?;
        self.pos += got as u64;
        if got < len {
            return Err(FileError::Truncated {
                section,
                need,
                got: self.pos,
            });
        }
        Ok(Bytes::from(buf))
    }

    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// RecordIterator walks chunks in index order, blocks per chunk and records
/// per block. It holds one decoded chunk and one block of records at a time.
///
/// A chunk that fails to read or decode yields its error once; the next call
/// continues with the following chunk.
pub struct RecordIterator<C> {
    ctx: Arc<FileContext>,
    cursor: C,

    next_chunk: usize,
    chunk: Option<ChunkView>,
    next_block: usize,
    pending: VecDeque<Record>,
}

impl<C: ByteCursor> RecordIterator<C> {
    pub(crate) fn new(ctx: Arc<FileContext>, cursor: C) -> Self {
        Self {
            ctx,
            cursor,
            next_chunk: 0,
            chunk: None,
            next_block: 0,
            pending: VecDeque::new(),
        }
    }

    /// chunk_position returns the index of the next chunk to be read.
    pub fn chunk_position(&self) -> usize {
        self.next_chunk
    }
}

#[async_trait]
impl<C: ByteCursor> AsyncIterator for RecordIterator<C> {
    type Item = Record;
    type Error = Error;

    async fn try_next(&mut self) -> Result<Option<Record>, Error> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            if let Some(chunk) = &self.chunk {
                if self.next_block < chunk.block_count() {
                    let block = self.next_block;
                    self.next_block += 1;

                    let records = chunk
                        .block(block)
                        .map(|view| view.records().collect::<Vec<_>>());
                    match records {
                        Ok(records) => self.pending.extend(records),
                        Err(e) => {
                            self.chunk = None;
                            return Err(e.into());
                        }
                    }
                    continue;
                }
                self.chunk = None;
            }

            if self.next_chunk >= self.ctx.index.len() {
                return Ok(None);
            }

            let i = self.next_chunk;
            self.next_chunk += 1;
            self.chunk = Some(self.ctx.read_chunk(&mut self.cursor, i).await?);
            self.next_block = 0;
        }
    }
}
