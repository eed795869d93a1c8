//! Content-addressed artifact blob storage
//!
//! Artifact bytes are stored by their sha256 hash, two-level sharded
//! (`ab/cdef...`), so identical content is written once and a hash in the
//! database is always enough to find the bytes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

/// Storage backend for artifact bytes
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes`, returning the content hash they are addressable by
    ///
    /// Idempotent: storing the same bytes twice returns the same hash and
    /// leaves a single copy on disk.
    async fn put(&self, bytes: &[u8]) -> Result<String>;

    /// Open a reader over the blob with the given content hash
    async fn open(&self, content_hash: &str) -> Result<File>;

    /// Size in bytes of the stored blob
    async fn size(&self, content_hash: &str) -> Result<u64>;

    /// Whether a blob with this hash exists
    async fn contains(&self, content_hash: &str) -> Result<bool>;
}

/// Filesystem-backed blob store
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, content_hash: &str) -> Result<PathBuf> {
        if content_hash.len() != 64 || !content_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::BlobStore(format!(
                "invalid content hash: {content_hash}"
            )));
        }
        Ok(self.root.join(&content_hash[..2]).join(&content_hash[2..]))
    }

    /// Hex sha256 of `bytes`
    pub fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = Self::hash_bytes(bytes);
        let path = self.path_for(&hash)?;

        if tokio::fs::try_exists(&path).await? {
            return Ok(hash);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a temp name then rename so a crash never leaves a partial
        // blob at the addressed path.
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        Ok(hash)
    }

    async fn open(&self, content_hash: &str) -> Result<File> {
        let path = self.path_for(content_hash)?;
        File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("blob {content_hash}"))
            } else {
                Error::Io(e)
            }
        })
    }

    async fn size(&self, content_hash: &str) -> Result<u64> {
        let path = self.path_for(content_hash)?;
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("blob {content_hash}"))
            } else {
                Error::Io(e)
            }
        })?;
        Ok(meta.len())
    }

    async fn contains(&self, content_hash: &str) -> Result<bool> {
        let path = self.path_for(content_hash)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
