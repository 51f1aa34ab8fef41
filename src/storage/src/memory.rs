use std::io;

use bytes::{Bytes, BytesMut};

use crate::{check_range, RandomAccessFile, Writable};

/// MemoryFile is a fully buffered byte source. `read_bytes` hands out
/// slices of the shared buffer without copying.
#[derive(Clone, Debug, Default)]
pub struct MemoryFile {
    data: Bytes,
}

impl MemoryFile {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl From<Vec<u8>> for MemoryFile {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

#[async_trait]
impl RandomAccessFile for MemoryFile {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let size = buf.len();
        if size == 0 {
            return Ok(0);
        }

        check_range(offset, size, self.len())?;
        let offset = offset as usize;
        buf.copy_from_slice(&self.data[offset..offset + size]);
        Ok(size)
    }

    async fn read_bytes(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        check_range(offset, len, self.len())?;
        let offset = offset as usize;
        Ok(self.data.slice(offset..offset + len))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn close(self) -> io::Result<()> {
        Ok(())
    }
}

/// MemoryWritable collects appended bytes in memory.
#[derive(Debug, Default)]
pub struct MemoryWritable {
    buf: BytesMut,
}

impl MemoryWritable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

#[async_trait]
impl Writable for MemoryWritable {
    async fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    async fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
