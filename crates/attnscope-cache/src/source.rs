//! Where layer bytes come from

use crate::{CacheError, Result};
use async_trait::async_trait;
use attnscope_core::{layer_file_name, META_FILE_NAME};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// A dataset's raw resources: per-layer binaries and `meta.json`.
#[async_trait]
pub trait LayerSource: Send + Sync {
    /// Raw bytes of `attn_layer_<layer>.bin`.
    async fn fetch_layer(&self, layer: usize) -> Result<Bytes>;

    /// Raw bytes of `meta.json`.
    async fn fetch_meta(&self) -> Result<Bytes>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Dataset directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsSource {
    dir: PathBuf,
}

impl FsSource {
    /// Create a source reading from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Source for dataset `id` under `root` (`"."` is `root` itself).
    pub fn for_dataset(root: impl AsRef<Path>, id: &str) -> Self {
        if id == "." {
            Self::new(root.as_ref())
        } else {
            Self::new(root.as_ref().join(id))
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.dir.join(name);
        debug!("Reading: {}", path.display());
        let data = fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CacheError::NotFound(path.display().to_string()),
            _ => CacheError::Io(format!("{}: {}", path.display(), e)),
        })?;
        Ok(Bytes::from(data))
    }
}

#[async_trait]
impl LayerSource for FsSource {
    async fn fetch_layer(&self, layer: usize) -> Result<Bytes> {
        self.read(&layer_file_name(layer)).await
    }

    async fn fetch_meta(&self) -> Result<Bytes> {
        self.read(META_FILE_NAME).await
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_source_reads_layer_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("attn_layer_03.bin"), [1u8, 2, 3, 4]).unwrap();

        let source = FsSource::new(dir.path());
        let bytes = source.fetch_layer(3).await.unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_fs_source_missing_layer() {
        let dir = tempdir().unwrap();
        let source = FsSource::new(dir.path());

        let err = source.fetch_layer(9).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound(ref p) if p.contains("attn_layer_09.bin")));
    }

    #[test]
    fn test_dataset_root_sentinel() {
        let root = Path::new("/data");
        assert_eq!(FsSource::for_dataset(root, ".").dir(), Path::new("/data"));
        assert_eq!(
            FsSource::for_dataset(root, "sample1").dir(),
            Path::new("/data/sample1")
        );
    }
}
