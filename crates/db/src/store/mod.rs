//! The job store seam.
//!
//! [`JobStore`] is the only persistence interface the pipeline sees. Both
//! implementations provide the same compare-and-set semantics: every
//! mutating method applies only when the job is in an allowed source state
//! and reports whether it did.
//!
//! - [`PgJobStore`] -- Postgres, via [`VideoJobRepo`] guarded updates.
//! - [`MemoryJobStore`] -- a mutex-protected map for tests and
//!   database-less development.

use async_trait::async_trait;
use talkgen_core::types::{JobId, Timestamp};

use crate::models::video_job::{NewVideoJob, VideoJob, VideoJobListQuery};
use crate::repositories::VideoJobRepo;
use crate::DbPool;

pub mod memory;

pub use memory::MemoryJobStore;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors surfaced by a [`JobStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness rule was violated (e.g. a reused provider job id).
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// PostgreSQL unique violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

fn map_unique_violation(err: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(format!("{what} already exists"));
        }
    }
    StoreError::Database(err)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistent record of video jobs with atomic conditional updates.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Confirm the backing store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Insert a new job in `Created` state.
    async fn create(&self, owner_id: &str, input: &NewVideoJob) -> Result<VideoJob, StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<VideoJob>, StoreError>;

    async fn find_by_provider_job_id(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<VideoJob>, StoreError>;

    async fn list_by_owner(
        &self,
        owner_id: &str,
        params: &VideoJobListQuery,
    ) -> Result<Vec<VideoJob>, StoreError>;

    /// Claim submission of a `Created` job and store its new token digest.
    /// See [`VideoJobRepo::try_begin_submitting`].
    async fn try_begin_submitting(
        &self,
        id: JobId,
        token_hash: &str,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Release the submission claim held under `token_hash`.
    async fn release_submitting(&self, id: JobId, token_hash: &str) -> Result<(), StoreError>;

    /// `Created -> Submitted`, recording the provider job id. Applies only
    /// while `token_hash` is the stored digest.
    ///
    /// Fails with [`StoreError::Conflict`] if another job already owns
    /// `provider_job_id`.
    async fn mark_submitted(
        &self,
        id: JobId,
        provider_job_id: &str,
        token_hash: &str,
    ) -> Result<bool, StoreError>;

    /// `Submitted | Processing -> Processing`, storing the provider status.
    async fn record_progress(&self, id: JobId, provider_status: &str) -> Result<bool, StoreError>;

    /// Count a poll attempt on a non-terminal job.
    async fn record_poll(&self, id: JobId, provider_status: Option<&str>)
        -> Result<(), StoreError>;

    /// Claim the finalizing phase. See [`VideoJobRepo::try_begin_finalizing`].
    async fn try_begin_finalizing(
        &self,
        id: JobId,
        claim: uuid::Uuid,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Release a finalizing claim held by `claim`.
    async fn release_finalizing(&self, id: JobId, claim: uuid::Uuid) -> Result<(), StoreError>;

    /// Non-terminal -> `Done` with the durable result URL.
    async fn complete(&self, id: JobId, result_url: &str) -> Result<bool, StoreError>;

    /// Non-terminal -> `Failed` with a summary and structured details.
    async fn fail(
        &self,
        id: JobId,
        error_message: &str,
        error_details: &serde_json::Value,
    ) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by the `video_jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
}

impl PgJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn create(&self, owner_id: &str, input: &NewVideoJob) -> Result<VideoJob, StoreError> {
        let id = talkgen_core::types::new_job_id();
        Ok(VideoJobRepo::create(&self.pool, id, owner_id, input).await?)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<VideoJob>, StoreError> {
        Ok(VideoJobRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_provider_job_id(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<VideoJob>, StoreError> {
        Ok(VideoJobRepo::find_by_provider_job_id(&self.pool, provider_job_id).await?)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        params: &VideoJobListQuery,
    ) -> Result<Vec<VideoJob>, StoreError> {
        Ok(VideoJobRepo::list_by_owner(&self.pool, owner_id, params).await?)
    }

    async fn try_begin_submitting(
        &self,
        id: JobId,
        token_hash: &str,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(VideoJobRepo::try_begin_submitting(&self.pool, id, token_hash, stale_before).await?)
    }

    async fn release_submitting(&self, id: JobId, token_hash: &str) -> Result<(), StoreError> {
        Ok(VideoJobRepo::release_submitting(&self.pool, id, token_hash).await?)
    }

    async fn mark_submitted(
        &self,
        id: JobId,
        provider_job_id: &str,
        token_hash: &str,
    ) -> Result<bool, StoreError> {
        VideoJobRepo::mark_submitted(&self.pool, id, provider_job_id, token_hash)
            .await
            .map_err(|e| map_unique_violation(e, "provider job id"))
    }

    async fn record_progress(&self, id: JobId, provider_status: &str) -> Result<bool, StoreError> {
        Ok(VideoJobRepo::record_progress(&self.pool, id, provider_status).await?)
    }

    async fn record_poll(
        &self,
        id: JobId,
        provider_status: Option<&str>,
    ) -> Result<(), StoreError> {
        Ok(VideoJobRepo::record_poll(&self.pool, id, provider_status).await?)
    }

    async fn try_begin_finalizing(
        &self,
        id: JobId,
        claim: uuid::Uuid,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(VideoJobRepo::try_begin_finalizing(&self.pool, id, claim, stale_before).await?)
    }

    async fn release_finalizing(&self, id: JobId, claim: uuid::Uuid) -> Result<(), StoreError> {
        Ok(VideoJobRepo::release_finalizing(&self.pool, id, claim).await?)
    }

    async fn complete(&self, id: JobId, result_url: &str) -> Result<bool, StoreError> {
        Ok(VideoJobRepo::complete(&self.pool, id, result_url).await?)
    }

    async fn fail(
        &self,
        id: JobId,
        error_message: &str,
        error_details: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(VideoJobRepo::fail(&self.pool, id, error_message, error_details).await?)
    }
}
