//! Durable blob storage for finished assets.
//!
//! [`BlobStore`] accepts a byte stream under a caller-chosen key and returns
//! a long-lived public URL. Writing the same key twice replaces the object,
//! which is what makes repeated asset persistence idempotent.
//!
//! - [`LocalBlobStore`] -- filesystem directory served by a static host.
//! - [`S3BlobStore`] -- Amazon S3 or a compatible service.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub mod local;
pub mod s3;

pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};

/// Streamed object body. Errors come from the source being read.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Errors from a [`BlobStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key is empty or would escape the storage root.
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    /// Reading the input stream failed (the upstream source broke).
    #[error("Reading source stream failed: {0}")]
    Source(std::io::Error),

    /// Writing to the local filesystem failed.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote object store refused or failed the upload.
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Write-once-per-key object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object, and return
    /// its public URL.
    async fn put(
        &self,
        key: &str,
        body: ByteStream,
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Public URL an object under `key` is (or would be) served from.
    fn public_url(&self, key: &str) -> String;
}

/// Reject keys that could escape the storage root.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    if talkgen_core::storage::is_safe_key(key) {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
