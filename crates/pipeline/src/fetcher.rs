//! Download a finished asset and persist it to blob storage.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use talkgen_core::failure::FailureKind;
use talkgen_core::storage::content_type_for_key;
use talkgen_storage::{BlobStore, StorageError};

/// Errors from [`AssetPersister::persist`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The remote asset could not be retrieved.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// The asset could not be written to blob storage.
    #[error("Storage failed: {0}")]
    StorageFailed(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::DownloadFailed(_) => FailureKind::DownloadFailed,
            Self::StorageFailed(_) => FailureKind::StorageFailed,
        }
    }
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Source(e) => Self::DownloadFailed(e.to_string()),
            other => Self::StorageFailed(other.to_string()),
        }
    }
}

/// Copies a remote asset to durable storage.
///
/// Persisting the same key twice overwrites the object, so callers may
/// retry freely.
#[async_trait]
pub trait AssetPersister: Send + Sync {
    /// Copy `remote_url` to `destination_key` and return its public URL.
    async fn persist(&self, remote_url: &str, destination_key: &str) -> Result<String, FetchError>;
}

/// [`AssetPersister`] streaming over HTTP into a [`BlobStore`].
pub struct AssetFetcher {
    client: reqwest::Client,
    store: Arc<dyn BlobStore>,
}

impl AssetFetcher {
    pub fn new(client: reqwest::Client, store: Arc<dyn BlobStore>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl AssetPersister for AssetFetcher {
    async fn persist(&self, remote_url: &str, destination_key: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(remote_url)
            .send()
            .await
            .map_err(|e| FetchError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::DownloadFailed(format!(
                "HTTP {} from asset URL",
                status.as_u16()
            )));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let url = self
            .store
            .put(
                destination_key,
                Box::pin(body),
                content_type_for_key(destination_key),
            )
            .await?;

        tracing::info!(key = destination_key, url = %url, "Persisted provider asset");
        Ok(url)
    }
}
