use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::Writable;

/// WritableFile appends to a newly created file. An existing file at the
/// same path is an error, so a finished container is never overwritten.
pub struct WritableFile {
    f: File,
    path: PathBuf,
}

impl WritableFile {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .append(true)
            .open(path.as_ref())
            .await?;

        Ok(Self {
            f,
            path: path.as_ref().to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// remove drops the handle and deletes the file.
    pub async fn remove(self) -> io::Result<()> {
        let Self { f, path } = self;
        drop(f);
        tokio::fs::remove_file(path).await
    }
}

#[async_trait]
impl Writable for WritableFile {
    async fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.f.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.f.flush().await
    }

    async fn sync(&self) -> io::Result<()> {
        self.f.sync_all().await
    }
}

#[cfg(test)]
mod tests {
    use crate::file::writable_file::WritableFile;
    use crate::Writable;

    #[tokio::test]
    async fn test_writable_file_append() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.as_ref().join("kbt_append");

        let mut w = WritableFile::create(&path).await?;
        w.append(b"0123").await?;
        w.append(b"4567").await?;
        w.flush().await?;
        w.sync().await?;

        assert_eq!(tokio::fs::read(&path).await?, b"01234567");

        // create_new refuses to clobber an existing file
        assert!(WritableFile::create(&path).await.is_err());

        w.remove().await?;
        assert!(!path.exists());
        Ok(())
    }
}
