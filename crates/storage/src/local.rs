//! Filesystem blob store.
//!
//! Objects are streamed to a temporary sibling file and renamed into place,
//! so readers never observe a partially written object and a rewrite of the
//! same key atomically replaces the previous one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::{check_key, BlobStore, ByteStream, StorageError};

/// Blob store rooted at a local directory.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    /// * `root` - directory objects are written under.
    /// * `public_base_url` - origin that serves `root`, e.g. `https://cdn.example.com/media`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Filesystem path for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_stream(path: &Path, mut body: ByteStream) -> Result<u64, StorageError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StorageError::Source)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
    ) -> Result<String, StorageError> {
        check_key(key)?;
        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = target.with_extension(format!("part-{}", uuid::Uuid::new_v4()));
        let written = match Self::write_stream(&tmp, body).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::info!(key, bytes = written, content_type, "Stored blob on local disk");
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        talkgen_core::storage::public_url(&self.public_base_url, key)
    }
}
