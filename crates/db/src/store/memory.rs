//! In-memory [`JobStore`].
//!
//! All guarded transitions run under one async mutex, which gives the same
//! single-writer outcome as the conditional `UPDATE`s in Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use talkgen_core::types::{JobId, Timestamp};
use tokio::sync::Mutex;

use crate::models::status::VideoJobStatus;
use crate::models::video_job::{NewVideoJob, VideoJob, VideoJobListQuery};
use crate::store::{JobStore, StoreError};

/// Mutex-protected map of jobs keyed by id.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, VideoJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Apply `f` to a job if `allowed` accepts its current status.
    async fn update_if<A, F>(&self, id: JobId, allowed: A, f: F) -> bool
    where
        A: FnOnce(&VideoJob) -> bool,
        F: FnOnce(&mut VideoJob),
    {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&id) {
            Some(job) if allowed(job) => {
                f(job);
                job.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Database(sqlx::Error::Encode(Box::new(e))))
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, owner_id: &str, input: &NewVideoJob) -> Result<VideoJob, StoreError> {
        let now = Utc::now();
        let job = VideoJob {
            id: talkgen_core::types::new_job_id(),
            owner_id: owner_id.to_string(),
            status_id: VideoJobStatus::Created.id(),
            provider_job_id: None,
            provider_status: None,
            source_image_url: input.source_image_url.clone(),
            speech: encode(&input.speech)?,
            style: encode(&input.style)?,
            callback_token_hash: String::new(),
            submit_claimed_at: None,
            result_url: None,
            error_message: None,
            error_details: None,
            poll_attempts: 0,
            finalize_claim: None,
            finalize_claimed_at: None,
            submitted_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<VideoJob>, StoreError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn find_by_provider_job_id(
        &self,
        provider_job_id: &str,
    ) -> Result<Option<VideoJob>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .find(|j| j.provider_job_id.as_deref() == Some(provider_job_id))
            .cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        params: &VideoJobListQuery,
    ) -> Result<Vec<VideoJob>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut owned: Vec<VideoJob> = jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .filter(|j| params.status_id.is_none_or(|s| j.status_id == s))
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(owned
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect())
    }

    async fn try_begin_submitting(
        &self,
        id: JobId,
        token_hash: &str,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_if(
                id,
                |j| {
                    j.status() == VideoJobStatus::Created
                        && j.submit_claimed_at.is_none_or(|at| at < stale_before)
                },
                |j| {
                    j.callback_token_hash = token_hash.to_string();
                    j.submit_claimed_at = Some(Utc::now());
                },
            )
            .await)
    }

    async fn release_submitting(&self, id: JobId, token_hash: &str) -> Result<(), StoreError> {
        self.update_if(
            id,
            |j| j.status() == VideoJobStatus::Created && j.callback_token_hash == token_hash,
            |j| j.submit_claimed_at = None,
        )
        .await;
        Ok(())
    }

    async fn mark_submitted(
        &self,
        id: JobId,
        provider_job_id: &str,
        token_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let taken = jobs
            .values()
            .any(|j| j.id != id && j.provider_job_id.as_deref() == Some(provider_job_id));
        if taken {
            return Err(StoreError::Conflict("provider job id already exists".into()));
        }
        match jobs.get_mut(&id) {
            Some(job)
                if job.status() == VideoJobStatus::Created
                    && job.callback_token_hash == token_hash =>
            {
                let now = Utc::now();
                job.status_id = VideoJobStatus::Submitted.id();
                job.submit_claimed_at = None;
                job.provider_job_id = Some(provider_job_id.to_string());
                job.submitted_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_progress(&self, id: JobId, provider_status: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_if(
                id,
                |j| {
                    matches!(
                        j.status(),
                        VideoJobStatus::Submitted | VideoJobStatus::Processing
                    )
                },
                |j| {
                    j.status_id = VideoJobStatus::Processing.id();
                    j.provider_status = Some(provider_status.to_string());
                },
            )
            .await)
    }

    async fn record_poll(
        &self,
        id: JobId,
        provider_status: Option<&str>,
    ) -> Result<(), StoreError> {
        self.update_if(
            id,
            |j| !j.is_terminal(),
            |j| {
                j.poll_attempts += 1;
                if let Some(status) = provider_status {
                    j.provider_status = Some(status.to_string());
                }
            },
        )
        .await;
        Ok(())
    }

    async fn try_begin_finalizing(
        &self,
        id: JobId,
        claim: uuid::Uuid,
        stale_before: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_if(
                id,
                |j| {
                    !j.is_terminal()
                        && (j.finalize_claim.is_none()
                            || j.finalize_claimed_at.is_some_and(|at| at < stale_before))
                },
                |j| {
                    j.finalize_claim = Some(claim);
                    j.finalize_claimed_at = Some(Utc::now());
                },
            )
            .await)
    }

    async fn release_finalizing(&self, id: JobId, claim: uuid::Uuid) -> Result<(), StoreError> {
        self.update_if(
            id,
            |j| j.finalize_claim == Some(claim),
            |j| {
                j.finalize_claim = None;
                j.finalize_claimed_at = None;
            },
        )
        .await;
        Ok(())
    }

    async fn complete(&self, id: JobId, result_url: &str) -> Result<bool, StoreError> {
        Ok(self
            .update_if(
                id,
                |j| !j.is_terminal(),
                |j| {
                    j.status_id = VideoJobStatus::Done.id();
                    j.result_url = Some(result_url.to_string());
                    j.completed_at = Some(Utc::now());
                    j.finalize_claim = None;
                    j.finalize_claimed_at = None;
                },
            )
            .await)
    }

    async fn fail(
        &self,
        id: JobId,
        error_message: &str,
        error_details: &serde_json::Value,
    ) -> Result<bool, StoreError> {
        Ok(self
            .update_if(
                id,
                |j| !j.is_terminal(),
                |j| {
                    j.status_id = VideoJobStatus::Failed.id();
                    j.error_message = Some(error_message.to_string());
                    j.error_details = Some(error_details.clone());
                    j.completed_at = Some(Utc::now());
                    j.finalize_claim = None;
                    j.finalize_claimed_at = None;
                },
            )
            .await)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
