//! Completion reconciliation.
//!
//! Webhook deliveries and polling observations both land in
//! [`Reconciler::reconcile`]. Every state change goes through a guarded
//! store update, so concurrent or duplicate observations converge on a
//! single terminal outcome and a single asset persist.
//!
//! The `done` path runs in two steps: a finalizing lease is claimed with a
//! compare-and-set, the asset is persisted, and only then is the job
//! committed as `Done`. Losers of the lease answer
//! [`ReconcileOutcome::Finalizing`] without touching the asset.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use talkgen_core::callback::verify_callback_token;
use talkgen_core::failure::{ErrorDetail, FailureKind};
use talkgen_core::storage::video_key;
use talkgen_core::types::JobId;
use talkgen_db::models::status::VideoJobStatus;
use talkgen_db::models::video_job::VideoJob;
use talkgen_db::store::{JobStore, StoreError};
use talkgen_events::{EventBus, JobEvent};
use talkgen_provider::{ProviderStatus, StatusReport};

use crate::fetcher::{AssetPersister, FetchError};

/// How long a finalizing claim is honoured before another writer may take it over.
pub const DEFAULT_FINALIZE_LEASE: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// One provider status observation, from either a webhook or a poll.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusObservation {
    pub provider_job_id: String,
    pub status: ProviderStatus,
    pub result_url: Option<String>,
    pub error: Option<serde_json::Value>,
}

impl StatusObservation {
    pub fn from_report(provider_job_id: impl Into<String>, report: StatusReport) -> Self {
        Self {
            provider_job_id: provider_job_id.into(),
            status: report.status,
            result_url: report.result_url,
            error: report.error,
        }
    }
}

/// Where an observation came from.
#[derive(Debug, Clone)]
pub enum CompletionSource {
    /// Pushed by the provider to the per-job callback URL.
    Webhook { job_id: JobId, token: String },
    /// Fetched by this service; no credential check needed.
    Poll,
}

impl CompletionSource {
    fn label(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::Poll => "poll",
        }
    }
}

/// Result of applying an observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The job is `Done` with a durable URL.
    Done { result_url: String },
    /// The job is `Failed`.
    Failed {
        message: String,
        details: serde_json::Value,
    },
    /// The job is still being generated.
    Processing,
    /// Another writer is persisting the asset right now.
    Finalizing,
}

impl ReconcileOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Failed { .. })
    }

    /// Terminal outcome stored on `job`, if it has one.
    pub fn from_terminal_job(job: &VideoJob) -> Option<Self> {
        match job.status() {
            VideoJobStatus::Done => Some(Self::Done {
                result_url: job.result_url.clone().unwrap_or_default(),
            }),
            VideoJobStatus::Failed => Some(Self::Failed {
                message: job.error_message.clone().unwrap_or_default(),
                details: job
                    .error_details
                    .clone()
                    .unwrap_or(serde_json::Value::Null),
            }),
            _ => None,
        }
    }
}

/// Errors from [`Reconciler::reconcile`]. None of them mutate the job.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Callback token mismatch")]
    Unauthorized,

    #[error("Provider job id mismatch for job {job_id}")]
    ProviderJobMismatch { job_id: JobId },

    #[error("Done observation without a result URL")]
    MissingResultUrl,

    #[error(transparent)]
    Persist(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies provider observations to jobs.
pub struct Reconciler {
    store: Arc<dyn JobStore>,
    persister: Arc<dyn AssetPersister>,
    event_bus: Arc<EventBus>,
    finalize_lease: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn JobStore>,
        persister: Arc<dyn AssetPersister>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            persister,
            event_bus,
            finalize_lease: DEFAULT_FINALIZE_LEASE,
        }
    }

    /// Override the finalizing lease duration.
    pub fn with_finalize_lease(mut self, lease: Duration) -> Self {
        self.finalize_lease = lease;
        self
    }

    /// Apply `observation` to its job.
    pub async fn reconcile(
        &self,
        observation: &StatusObservation,
        source: &CompletionSource,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let job = self.authorize(observation, source).await?;

        if let Some(stored) = ReconcileOutcome::from_terminal_job(&job) {
            log_if_inconsistent(&job, observation, source);
            return Ok(stored);
        }

        tracing::debug!(
            job_id = %job.id,
            provider_status = %observation.status,
            source = source.label(),
            "Reconciling provider observation",
        );

        match observation.status {
            ProviderStatus::Done => self.finalize(&job, observation).await,
            ProviderStatus::Error => {
                self.fail(&job, FailureKind::GenerationError, observation)
                    .await
            }
            ProviderStatus::Rejected => {
                self.fail(&job, FailureKind::GenerationRejected, observation)
                    .await
            }
            ProviderStatus::Created | ProviderStatus::Started => {
                if self
                    .store
                    .record_progress(job.id, observation.status.as_str())
                    .await?
                {
                    Ok(ReconcileOutcome::Processing)
                } else {
                    self.current_outcome(job.id, ReconcileOutcome::Processing)
                        .await
                }
            }
        }
    }

    /// Resolve the job and check the webhook credentials before any mutation.
    async fn authorize(
        &self,
        observation: &StatusObservation,
        source: &CompletionSource,
    ) -> Result<VideoJob, ReconcileError> {
        match source {
            CompletionSource::Webhook { job_id, token } => {
                let job = self
                    .store
                    .find_by_id(*job_id)
                    .await?
                    .ok_or_else(|| ReconcileError::UnknownJob(job_id.to_string()))?;

                if !verify_callback_token(token, &job.callback_token_hash) {
                    tracing::warn!(job_id = %job.id, "Rejected webhook with invalid token");
                    return Err(ReconcileError::Unauthorized);
                }
                if job.provider_job_id.as_deref() != Some(observation.provider_job_id.as_str()) {
                    tracing::warn!(
                        job_id = %job.id,
                        provider_job_id = %observation.provider_job_id,
                        "Webhook provider job id does not match the job",
                    );
                    return Err(ReconcileError::ProviderJobMismatch { job_id: job.id });
                }
                Ok(job)
            }
            CompletionSource::Poll => self
                .store
                .find_by_provider_job_id(&observation.provider_job_id)
                .await?
                .ok_or_else(|| ReconcileError::UnknownJob(observation.provider_job_id.clone())),
        }
    }

    async fn finalize(
        &self,
        job: &VideoJob,
        observation: &StatusObservation,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let remote_url = observation
            .result_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ReconcileError::MissingResultUrl)?;

        let claim = uuid::Uuid::new_v4();
        let lease = chrono::Duration::from_std(self.finalize_lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let stale_before = Utc::now() - lease;

        if !self
            .store
            .try_begin_finalizing(job.id, claim, stale_before)
            .await?
        {
            tracing::debug!(job_id = %job.id, "Finalizing already claimed by another writer");
            return self
                .current_outcome(job.id, ReconcileOutcome::Finalizing)
                .await;
        }

        let key = video_key(job.id);
        let durable_url = match self.persister.persist(remote_url, &key).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Asset persistence failed");
                if let Err(release_err) = self.store.release_finalizing(job.id, claim).await {
                    tracing::warn!(
                        job_id = %job.id,
                        error = %release_err,
                        "Failed to release finalizing claim",
                    );
                }
                return Err(e.into());
            }
        };

        if self.store.complete(job.id, &durable_url).await? {
            tracing::info!(job_id = %job.id, result_url = %durable_url, "Video job completed");
            self.event_bus
                .publish(JobEvent::completed(job.id, &job.owner_id, &durable_url));
            return Ok(ReconcileOutcome::Done {
                result_url: durable_url,
            });
        }

        tracing::info!(job_id = %job.id, "Lost completion race; returning stored result");
        self.current_outcome(job.id, ReconcileOutcome::Finalizing)
            .await
    }

    async fn fail(
        &self,
        job: &VideoJob,
        kind: FailureKind,
        observation: &StatusObservation,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let detail = ErrorDetail::new(kind).with_provider_error(observation.error.clone());
        let details = detail.to_json();

        if self.store.fail(job.id, &detail.message, &details).await? {
            tracing::warn!(
                job_id = %job.id,
                kind = kind.as_str(),
                "Video job failed",
            );
            self.event_bus.publish(JobEvent::failed(
                job.id,
                &job.owner_id,
                &detail.message,
                &details,
            ));
            return Ok(ReconcileOutcome::Failed {
                message: detail.message,
                details,
            });
        }

        self.current_outcome(job.id, ReconcileOutcome::Processing)
            .await
    }

    /// Re-read the job after a lost compare-and-set.
    ///
    /// Returns its terminal outcome if it has one, otherwise `fallback`.
    async fn current_outcome(
        &self,
        id: JobId,
        fallback: ReconcileOutcome,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let job = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ReconcileError::UnknownJob(id.to_string()))?;
        Ok(ReconcileOutcome::from_terminal_job(&job).unwrap_or(fallback))
    }
}

/// Warn when an observation for a terminal job disagrees with what is stored.
fn log_if_inconsistent(job: &VideoJob, observation: &StatusObservation, source: &CompletionSource) {
    let consistent = match job.status() {
        VideoJobStatus::Done => observation.status == ProviderStatus::Done,
        VideoJobStatus::Failed => matches!(
            observation.status,
            ProviderStatus::Error | ProviderStatus::Rejected
        ),
        _ => true,
    };
    if consistent {
        tracing::debug!(job_id = %job.id, source = source.label(), "Job already terminal; no-op");
    } else {
        tracing::warn!(
            job_id = %job.id,
            stored_status = %job.status(),
            observed_status = %observation.status,
            source = source.label(),
            "Observation disagrees with terminal job; keeping stored result",
        );
    }
}
