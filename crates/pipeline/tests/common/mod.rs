//! Shared fakes and fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use talkgen_core::callback::generate_callback_token;
use talkgen_core::speech::{SpeechSpec, StyleParams};
use talkgen_db::models::video_job::{NewVideoJob, VideoJob};
use talkgen_db::store::{JobStore, MemoryJobStore};
use talkgen_events::EventBus;
use talkgen_pipeline::{AssetPersister, FetchError, Reconciler, Sleeper};
use talkgen_provider::{
    ProviderError, ProviderStatus, StatusReport, SubmitRequest, SubmitResponse, VideoProvider,
};

pub const PUBLIC_MEDIA_BASE: &str = "https://media.test";

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Scripted [`VideoProvider`].
///
/// Queued responses are returned in order; once a queue is empty the
/// fallback status report (or a generated job id) is used.
pub struct FakeProvider {
    submit_script: Mutex<VecDeque<Result<SubmitResponse, ProviderError>>>,
    status_script: Mutex<VecDeque<Result<StatusReport, ProviderError>>>,
    fallback_status: StatusReport,
    submit_delay: Option<Duration>,
    pub submitted: Mutex<Vec<SubmitRequest>>,
    pub status_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(fallback: ProviderStatus) -> Self {
        Self {
            submit_script: Mutex::new(VecDeque::new()),
            status_script: Mutex::new(VecDeque::new()),
            fallback_status: report(fallback, None),
            submit_delay: None,
            submitted: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Each submit takes `delay` after recording the request.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub fn push_submit(&self, result: Result<SubmitResponse, ProviderError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: Result<StatusReport, ProviderError>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoProvider for FakeProvider {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        self.submitted.lock().unwrap().push(request.clone());
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.submit_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubmitResponse {
                provider_job_id: format!("tlk_{}", uuid::Uuid::new_v4().simple()),
            })
        })
    }

    async fn fetch_status(&self, _provider_job_id: &str) -> Result<StatusReport, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.status_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback_status.clone()))
    }
}

pub fn report(status: ProviderStatus, result_url: Option<&str>) -> StatusReport {
    StatusReport {
        status,
        result_url: result_url.map(str::to_string),
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Persister
// ---------------------------------------------------------------------------

/// [`AssetPersister`] that counts calls and can be told to fail or stall.
#[derive(Default)]
pub struct CountingPersister {
    pub calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Option<Duration>,
    pub persisted: Mutex<Vec<(String, String)>>,
}

impl CountingPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each persist takes `delay`, widening race windows.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail the next `n` persists with a download error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetPersister for CountingPersister {
    async fn persist(&self, remote_url: &str, destination_key: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(FetchError::DownloadFailed("connection reset".into()));
        }
        self.persisted
            .lock()
            .unwrap()
            .push((remote_url.to_string(), destination_key.to_string()));
        Ok(format!("{PUBLIC_MEDIA_BASE}/{destination_key}"))
    }
}

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// [`Sleeper`] that returns immediately and records requested delays.
#[derive(Default)]
pub struct InstantSleeper {
    pub delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub persister: Arc<CountingPersister>,
    pub event_bus: Arc<EventBus>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_persister(CountingPersister::new())
    }

    pub fn with_persister(persister: CountingPersister) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let persister = Arc::new(persister);
        let event_bus = Arc::new(EventBus::default());
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            persister.clone(),
            event_bus.clone(),
        ));
        Self {
            store,
            persister,
            event_bus,
            reconciler,
        }
    }

    /// Insert a job that has been submitted as `provider_job_id`.
    ///
    /// Returns the job and its plaintext callback token.
    pub async fn submitted_job(&self, provider_job_id: &str) -> (VideoJob, String) {
        let job = self.store.create("user-1", &new_job()).await.unwrap();
        let token = generate_callback_token();
        assert!(self
            .store
            .try_begin_submitting(job.id, &token.hash, chrono::Utc::now())
            .await
            .unwrap());
        assert!(self
            .store
            .mark_submitted(job.id, provider_job_id, &token.hash)
            .await
            .unwrap());
        let job = self.store.find_by_id(job.id).await.unwrap().unwrap();
        (job, token.plaintext)
    }

    pub async fn reload(&self, job: &VideoJob) -> VideoJob {
        self.store.find_by_id(job.id).await.unwrap().unwrap()
    }
}

pub fn new_job() -> NewVideoJob {
    NewVideoJob {
        source_image_url: "https://cdn.test/face.png".into(),
        speech: SpeechSpec::Audio {
            audio_url: "https://cdn.test/voice.mp3".into(),
        },
        style: StyleParams::default(),
    }
}
