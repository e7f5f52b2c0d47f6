//! Job creation and provider submission.

use std::sync::Arc;
use std::time::Duration;

use talkgen_core::callback::{callback_url, generate_callback_token};
use talkgen_core::error::CoreError;
use talkgen_core::failure::{ErrorDetail, FailureKind};
use talkgen_core::types::JobId;
use talkgen_db::models::status::VideoJobStatus;
use talkgen_db::models::video_job::{NewVideoJob, VideoJob};
use talkgen_db::store::{JobStore, StoreError};
use talkgen_events::{EventBus, JobEvent};
use talkgen_provider::{ProviderError, SubmitRequest, VideoProvider};

/// How long a submission claim blocks other submitters. Longer than any
/// provider request, so only a crashed submitter's claim goes stale.
pub const DEFAULT_SUBMIT_LEASE: Duration = Duration::from_secs(2 * 60);

/// Errors from [`SubmissionService`].
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Video job {0} not found")]
    NotFound(JobId),

    /// The job is past `Created` and cannot be (re)submitted.
    #[error("Video job {job_id} is {status} and cannot be submitted")]
    InvalidState {
        job_id: JobId,
        status: VideoJobStatus,
    },

    /// Another request is submitting this job right now.
    #[error("Video job {0} is already being submitted")]
    InProgress(JobId),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The stored speech or style JSON no longer decodes.
    #[error("Stored job parameters are unreadable: {0}")]
    CorruptParameters(#[from] serde_json::Error),
}

/// Creates jobs and submits them to the video provider.
pub struct SubmissionService {
    store: Arc<dyn JobStore>,
    provider: Arc<dyn VideoProvider>,
    event_bus: Arc<EventBus>,
    /// Externally reachable origin for webhook URLs. Without it the
    /// provider gets no webhook and completion relies on polling.
    public_base_url: Option<String>,
    submit_lease: Duration,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn JobStore>,
        provider: Arc<dyn VideoProvider>,
        event_bus: Arc<EventBus>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            event_bus,
            public_base_url,
            submit_lease: DEFAULT_SUBMIT_LEASE,
        }
    }

    /// Override how long a submission claim stays exclusive.
    pub fn with_submit_lease(mut self, lease: Duration) -> Self {
        self.submit_lease = lease;
        self
    }

    /// Validate `input` and insert it as a `Created` job.
    pub async fn create_job(
        &self,
        owner_id: &str,
        input: &NewVideoJob,
    ) -> Result<VideoJob, SubmissionError> {
        validate_new_job(input)?;
        let job = self.store.create(owner_id, input).await?;
        tracing::info!(
            job_id = %job.id,
            owner_id,
            speech = input.speech.kind(),
            "Created video job",
        );
        Ok(job)
    }

    /// Submit a `Created` job to the provider.
    ///
    /// Every attempt rotates the callback token under an exclusive claim,
    /// so concurrent callers cannot both reach the provider. A rate limit
    /// or outage releases the claim and leaves the job `Created` for a
    /// retry; a rejection fails it.
    pub async fn submit(&self, job_id: JobId) -> Result<VideoJob, SubmissionError> {
        let job = self.load(job_id).await?;
        if job.status() != VideoJobStatus::Created {
            return Err(SubmissionError::InvalidState {
                job_id,
                status: job.status(),
            });
        }

        let token = generate_callback_token();
        let stale_before = chrono::Utc::now()
            - chrono::Duration::from_std(self.submit_lease).unwrap_or(chrono::Duration::MAX);
        if !self
            .store
            .try_begin_submitting(job_id, &token.hash, stale_before)
            .await?
        {
            return Err(match self.invalid_state(job_id).await {
                SubmissionError::InvalidState {
                    status: VideoJobStatus::Created,
                    ..
                } => {
                    tracing::info!(job_id = %job_id, "Submission already in progress");
                    SubmissionError::InProgress(job_id)
                }
                other => other,
            });
        }

        let request = match self.build_request(&job, &token.plaintext) {
            Ok(request) => request,
            Err(e) => {
                self.store.release_submitting(job_id, &token.hash).await?;
                return Err(e);
            }
        };

        let response = match self.provider.submit(&request).await {
            Ok(response) => response,
            Err(e @ ProviderError::Rejected { .. }) => {
                self.fail_rejected(&job, &e).await?;
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "Submission deferred, job stays created",
                );
                self.store.release_submitting(job_id, &token.hash).await?;
                return Err(e.into());
            }
        };

        if !self
            .store
            .mark_submitted(job_id, &response.provider_job_id, &token.hash)
            .await?
        {
            tracing::warn!(
                job_id = %job_id,
                provider_job_id = %response.provider_job_id,
                "Submission claim lost before commit",
            );
            return Err(self.invalid_state(job_id).await);
        }

        tracing::info!(
            job_id = %job_id,
            provider_job_id = %response.provider_job_id,
            "Video job submitted",
        );
        self.load(job_id).await
    }

    /// [`create_job`](Self::create_job) followed by [`submit`](Self::submit).
    pub async fn create_and_submit(
        &self,
        owner_id: &str,
        input: &NewVideoJob,
    ) -> Result<VideoJob, SubmissionError> {
        let job = self.create_job(owner_id, input).await?;
        self.submit(job.id).await
    }

    fn build_request(&self, job: &VideoJob, token: &str) -> Result<SubmitRequest, SubmissionError> {
        Ok(SubmitRequest {
            source_url: job.source_image_url.clone(),
            speech: job.speech_spec()?,
            style: job.style_params()?,
            webhook_url: self
                .public_base_url
                .as_deref()
                .map(|base| callback_url(base, job.id, token)),
        })
    }

    async fn load(&self, job_id: JobId) -> Result<VideoJob, SubmissionError> {
        self.store
            .find_by_id(job_id)
            .await?
            .ok_or(SubmissionError::NotFound(job_id))
    }

    async fn invalid_state(&self, job_id: JobId) -> SubmissionError {
        match self.load(job_id).await {
            Ok(job) => SubmissionError::InvalidState {
                job_id,
                status: job.status(),
            },
            Err(e) => e,
        }
    }

    async fn fail_rejected(&self, job: &VideoJob, err: &ProviderError) -> Result<(), StoreError> {
        let payload = match err {
            ProviderError::Rejected { status, body } => Some(serde_json::json!({
                "status": status,
                "body": body,
            })),
            _ => None,
        };
        let detail = ErrorDetail::new(FailureKind::Rejected).with_provider_error(payload);
        let details = detail.to_json();

        if self.store.fail(job.id, &detail.message, &details).await? {
            tracing::warn!(job_id = %job.id, error = %err, "Provider rejected video job");
            self.event_bus.publish(JobEvent::failed(
                job.id,
                &job.owner_id,
                &detail.message,
                &details,
            ));
        }
        Ok(())
    }
}

/// Field checks for a new job.
pub fn validate_new_job(input: &NewVideoJob) -> Result<(), CoreError> {
    let url = input.source_image_url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(CoreError::Validation(
            "source_image_url must be an http(s) URL".into(),
        ));
    }
    input.speech.check()?;
    input.style.check()
}
