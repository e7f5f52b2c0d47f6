//! Amazon S3 (or compatible) blob store.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use bytes::BytesMut;
use futures::StreamExt;

use crate::{check_key, BlobStore, ByteStream, StorageError};

/// S3 connection settings.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    /// Origin objects are served from (bucket website, CDN, ...).
    pub public_base_url: String,
    /// Custom endpoint for S3-compatible services such as MinIO.
    pub endpoint_url: Option<String>,
}

/// Blob store writing objects to a single S3 bucket.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS environment (credentials chain,
    /// `AWS_REGION`, ...).
    pub async fn from_env(config: S3Config) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self::with_client(aws_sdk_s3::Client::from_conf(builder.build()), config)
    }

    pub fn with_client(client: aws_sdk_s3::Client, config: S3Config) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        mut body: ByteStream,
        content_type: &str,
    ) -> Result<String, StorageError> {
        check_key(key)?;

        // PutObject needs a known length, so buffer the download first.
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk.map_err(StorageError::Source)?);
        }
        let size = buf.len();

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .body(S3Body::from(buf.freeze()))
            .send()
            .await
            .map_err(|e| StorageError::Upload(format!("{}", aws_sdk_s3::error::DisplayErrorContext(e))))?;

        tracing::info!(
            bucket = %self.config.bucket,
            key,
            bytes = size,
            content_type,
            "Stored blob in S3",
        );
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        talkgen_core::storage::public_url(&self.config.public_base_url, key)
    }
}
