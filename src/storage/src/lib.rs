//! Byte sources and sinks the container codec reads from and writes to.
//!
//! The codec never touches the disk or the network itself: readers take a
//! [`RandomAccessFile`] (or any `AsyncRead` for streaming) and writers take a
//! [`Writable`].

#[macro_use]
extern crate async_trait;

use std::io;
use std::io::ErrorKind;

use bytes::Bytes;

pub mod file;
pub mod memory;
pub mod mmap;

pub use file::writable_file::WritableFile;
pub use memory::{MemoryFile, MemoryWritable};
pub use mmap::MmapReadableFile;

/// RandomAccessFile is a read-only byte source addressable at any offset.
#[async_trait]
pub trait RandomAccessFile: Send + Sync {
    /// read fills `buf` with the bytes at `offset`, returning the number of bytes read.
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// read_bytes returns exactly `len` bytes starting at `offset`.
    async fn read_bytes(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        let mut buf = vec![0_u8; len];
        let n = self.read(offset, buf.as_mut_slice()).await?;
        if n != len {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("short read at {}: {} < {}", offset, n, len),
            ));
        }
        Ok(Bytes::from(buf))
    }

    /// len returns the size of the source in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Writable is an append-only byte sink.
#[async_trait]
pub trait Writable: Send {
    async fn append(&mut self, data: &[u8]) -> io::Result<()>;

    async fn flush(&mut self) -> io::Result<()>;

    async fn sync(&self) -> io::Result<()>;
}

/// check_range rejects reads running past the end of a source of length `len`.
pub(crate) fn check_range(offset: u64, size: usize, len: u64) -> io::Result<()> {
    match offset.checked_add(size as u64) {
        Some(upper) if upper <= len => Ok(()),
        _ => Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("read {}+{} past end of source ({})", offset, size, len),
        )),
    }
}
