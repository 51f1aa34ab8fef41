use std::io;
use std::path::Path;

use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};
use tokio::fs::File;

use crate::{check_range, RandomAccessFile};

/// MmapReadableFile maps a whole file. `read_bytes` hands out slices of the
/// mapping without copying; they keep the mapping alive.
pub struct MmapReadableFile {
    f: File,
    len: usize,
    data: Bytes,
}

impl MmapReadableFile {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = File::open(path).await?;

        let meta = f.metadata().await?;
        let len = meta.len() as usize;

        // mapping a zero length file fails on some platforms
        let data = if len == 0 {
            Bytes::new()
        } else {
            let mmap: Mmap = unsafe { MmapOptions::new().offset(0).len(len).map(&f)? };
            Bytes::from_owner(mmap)
        };

        Ok(Self { f, len, data })
    }
}

#[async_trait]
impl RandomAccessFile for MmapReadableFile {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let size = buf.len();
        if size == 0 {
            return Ok(0);
        }

        check_range(offset, size, self.len as u64)?;
        let offset = offset as usize;
        buf.copy_from_slice(&self.data[offset..offset + size]);

        Ok(size)
    }

    async fn read_bytes(&self, offset: u64, len: usize) -> io::Result<Bytes> {
        check_range(offset, len, self.len as u64)?;
        let offset = offset as usize;
        Ok(self.data.slice(offset..offset + len))
    }

    fn len(&self) -> u64 {
        self.len as u64
    }

    async fn close(self) -> io::Result<()> {
        drop(self.data);
        drop(self.f);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::fs::File;
    use tokio::io;
    use tokio::io::AsyncWriteExt;

    use crate::mmap::MmapReadableFile;
    use crate::RandomAccessFile;

    #[tokio::test]
    async fn test_mmap_readable_file() -> io::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let kbt_file = dir.as_ref().join("kbt_test");

        let data = "0123456789".as_bytes();
        let len = {
            let mut f = File::create(&kbt_file).await?;
            f.write_all(data).await?;
            f.sync_all().await?;
            drop(f);
            data.len()
        };

        let accessor = MmapReadableFile::open(&kbt_file).await?;
        assert_eq!(accessor.len(), len as u64);

        let mut buf = vec![0_u8; len];
        accessor.read(0, &mut buf[..]).await?;
        assert_eq!(buf.as_slice(), data);

        let tail = accessor.read_bytes(7, 3).await?;
        assert_eq!(&tail[..], b"789");
        assert!(accessor.read_bytes(8, 3).await.is_err());

        // slices share the mapping and outlive the reader
        let head = accessor.read_bytes(0, 4).await?;
        accessor.close().await?;
        assert_eq!(&head[..], b"0123");
        assert_eq!(&tail[..], b"789");
        Ok(())
    }

    #[tokio::test]
    async fn test_mmap_empty_file() -> io::Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let kbt_file = dir.as_ref().join("kbt_empty");
        File::create(&kbt_file).await?;

        let accessor = MmapReadableFile::open(&kbt_file).await?;
        assert!(accessor.is_empty());
        assert!(accessor.read_bytes(0, 1).await.is_err());
        Ok(())
    }
}
