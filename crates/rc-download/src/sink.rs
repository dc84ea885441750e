use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufWriter};

pub type SinkWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type SinkReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where downloaded bytes end up.
///
/// Two tasks of the same batch must never target the same path; the sink
/// does not arbitrate concurrent writers.
#[async_trait]
pub trait ByteSink: Send + Sync {
    /// Truncating writer for `path`, creating parent directories as needed
    async fn open_for_write(&self, path: &Path) -> io::Result<SinkWriter>;

    /// Reader over what was written to `path`
    async fn open_for_read(&self, path: &Path) -> io::Result<SinkReader>;

    /// Drop whatever was written to `path`. Missing files are not an error.
    async fn discard(&self, path: &Path) -> io::Result<()>;
}

/// [`ByteSink`] over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSink;

#[async_trait]
impl ByteSink for FsSink {
    async fn open_for_write(&self, path: &Path) -> io::Result<SinkWriter> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(BufWriter::new(file)))
    }

    async fn open_for_read(&self, path: &Path) -> io::Result<SinkReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn discard(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_write_read_discard() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libraries/org/lwjgl/lwjgl.jar");
        let sink = FsSink;

        let mut writer = sink.open_for_write(&path).await.unwrap();
        writer.write_all(b"jar bytes").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut content = String::new();
        sink.open_for_read(&path)
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "jar bytes");

        sink.discard(&path).await.unwrap();
        assert!(!path.exists());
        sink.discard(&path).await.unwrap();
    }
}
