//! Holding areas for chunk bytes while a file is written. The data section
//! follows the chunk index on disk, so chunks are buffered until the index
//! is known.

use std::io;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use kobuta_storage::Writable;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// DataBuffer accumulates chunk bytes and replays them into the final sink.
#[async_trait]
pub trait DataBuffer: Send {
    async fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// len returns the number of bytes appended so far.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// copy_to appends the whole buffer to `w`, returning the number of bytes copied.
    async fn copy_to<W: Writable>(&mut self, w: &mut W) -> io::Result<u64>;

    /// close releases the buffer's resources.
    async fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// MemoryDataBuffer keeps the data section in memory.
#[derive(Debug, Default)]
pub struct MemoryDataBuffer {
    buf: BytesMut,
}

impl MemoryDataBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }
}

#[async_trait]
impl DataBuffer for MemoryDataBuffer {
    async fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    async fn copy_to<W: Writable>(&mut self, w: &mut W) -> io::Result<u64> {
        w.append(&self.buf).await?;
        Ok(self.buf.len() as u64)
    }

    async fn close(self) -> io::Result<()> {
        Ok(())
    }
}

/// FileDataBuffer spills the data section to a scratch file, which is
/// removed on close.
pub struct FileDataBuffer {
    f: File,
    path: PathBuf,
    len: u64,
}

impl FileDataBuffer {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path.as_ref())
            .await?;

        Ok(Self {
            f,
            path: path.as_ref().to_owned(),
            len: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

#[async_trait]
impl DataBuffer for FileDataBuffer {
    async fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.f.write_all(data).await?;
        self.len += data.len() as u64;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }

    async fn copy_to<W: Writable>(&mut self, w: &mut W) -> io::Result<u64> {
        self.f.flush().await?;
        self.f.seek(SeekFrom::Start(0)).await?;

        let mut buf = vec![0_u8; COPY_BUFFER_SIZE];
        let mut total = 0_u64;
        while total < self.len {
            let n = self.f.read(&mut buf).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "spill file {} ended at {} of {} bytes",
                        self.path.display(),
                        total,
                        self.len
                    ),
                ));
            }
            w.append(&buf[..n]).await?;
            total += n as u64;
        }

        // further appends land after the copied region
        self.f.seek(SeekFrom::End(0)).await?;
        Ok(total)
    }

    async fn close(self) -> io::Result<()> {
        let Self { f, path, .. } = self;
        drop(f);
        tokio::fs::remove_file(path).await
    }
}
