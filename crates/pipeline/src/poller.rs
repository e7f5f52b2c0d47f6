//! Polling driver for provider jobs.
//!
//! [`PollingDriver::run`] waits out the provider's registration lag, then
//! fetches the job status with a linearly growing delay until a terminal
//! status is reconciled, the attempt budget runs out, or the
//! [`CancellationToken`] fires. Running out of attempts leaves the job as
//! it is; a later webhook or another poll can still complete it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use talkgen_core::polling::PollConfig;
use talkgen_core::types::JobId;
use talkgen_db::models::video_job::VideoJob;
use talkgen_db::store::{JobStore, StoreError};
use talkgen_provider::{ProviderError, VideoProvider};
use tokio_util::sync::CancellationToken;

use crate::reconciler::{
    CompletionSource, ReconcileError, ReconcileOutcome, Reconciler, StatusObservation,
};

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Source of delays between polls, replaceable in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Outcome and errors
// ---------------------------------------------------------------------------

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Done {
        result_url: String,
    },
    Failed {
        message: String,
        details: serde_json::Value,
    },
    /// The attempt budget ran out before a terminal status was seen.
    StillProcessing {
        attempts: u32,
        last_status: Option<String>,
    },
    /// The run was cancelled; the job was left untouched.
    Cancelled,
}

impl PollOutcome {
    fn from_terminal(outcome: ReconcileOutcome) -> Option<Self> {
        match outcome {
            ReconcileOutcome::Done { result_url } => Some(Self::Done { result_url }),
            ReconcileOutcome::Failed { message, details } => {
                Some(Self::Failed { message, details })
            }
            ReconcileOutcome::Processing | ReconcileOutcome::Finalizing => None,
        }
    }
}

/// Errors that end a polling run early.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Job {0} has not been submitted to the provider")]
    NotSubmitted(JobId),

    /// A non-transient provider error (the status request was rejected).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Polls the provider and feeds each observation to the [`Reconciler`].
pub struct PollingDriver {
    provider: Arc<dyn VideoProvider>,
    store: Arc<dyn JobStore>,
    reconciler: Arc<Reconciler>,
    sleeper: Arc<dyn Sleeper>,
}

impl PollingDriver {
    pub fn new(
        provider: Arc<dyn VideoProvider>,
        store: Arc<dyn JobStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self::with_sleeper(provider, store, reconciler, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        provider: Arc<dyn VideoProvider>,
        store: Arc<dyn JobStore>,
        reconciler: Arc<Reconciler>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            provider,
            store,
            reconciler,
            sleeper,
        }
    }

    /// Poll `job` until it reaches a terminal state, the budget in `config`
    /// is spent, or `cancel` fires.
    pub async fn run(
        &self,
        job: &VideoJob,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, PollError> {
        if let Some(outcome) =
            ReconcileOutcome::from_terminal_job(job).and_then(PollOutcome::from_terminal)
        {
            return Ok(outcome);
        }
        let provider_job_id = job
            .provider_job_id
            .clone()
            .ok_or(PollError::NotSubmitted(job.id))?;

        tracing::info!(
            job_id = %job.id,
            provider_job_id = %provider_job_id,
            max_attempts = config.max_attempts,
            "Starting status polling",
        );

        if !self.wait(config.initial_delay, cancel).await {
            return Ok(cancelled(job.id));
        }

        let mut last_status: Option<String> = None;

        for attempt in 1..=config.max_attempts {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(cancelled(job.id)),
                result = self.provider.fetch_status(&provider_job_id) => result,
            };

            match fetched {
                Ok(report) => {
                    let status = report.status;
                    last_status = Some(status.as_str().to_string());
                    self.store.record_poll(job.id, Some(status.as_str())).await?;

                    let observation = StatusObservation::from_report(&provider_job_id, report);
                    match self
                        .reconciler
                        .reconcile(&observation, &CompletionSource::Poll)
                        .await
                    {
                        Ok(outcome) => {
                            if let Some(done) = PollOutcome::from_terminal(outcome) {
                                tracing::info!(job_id = %job.id, attempt, "Polling reached terminal state");
                                return Ok(done);
                            }
                        }
                        Err(e @ (ReconcileError::Persist(_) | ReconcileError::MissingResultUrl)) => {
                            tracing::warn!(
                                job_id = %job.id,
                                attempt,
                                error = %e,
                                "Finalization failed, will retry on next poll",
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        error = %e,
                        "Transient status error",
                    );
                    self.store.record_poll(job.id, None).await?;
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, attempt, error = %e, "Status request rejected");
                    return Err(e.into());
                }
            }

            if attempt < config.max_attempts && !self.wait(config.delay_after(attempt), cancel).await
            {
                return Ok(cancelled(job.id));
            }
        }

        tracing::info!(
            job_id = %job.id,
            attempts = config.max_attempts,
            last_status = last_status.as_deref().unwrap_or("none"),
            "Polling budget exhausted, job left in progress",
        );
        Ok(PollOutcome::StillProcessing {
            attempts: config.max_attempts,
            last_status,
        })
    }

    /// Run [`run`](Self::run) on a background task.
    pub fn spawn(
        self: &Arc<Self>,
        job: VideoJob,
        config: PollConfig,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<PollOutcome, PollError>> {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            let result = driver.run(&job, &config, &cancel).await;
            if let Err(e) = &result {
                tracing::error!(job_id = %job.id, error = %e, "Polling loop failed");
            }
            result
        })
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.sleeper.sleep(duration) => true,
        }
    }
}

fn cancelled(job_id: JobId) -> PollOutcome {
    tracing::info!(job_id = %job_id, "Polling cancelled");
    PollOutcome::Cancelled
}
