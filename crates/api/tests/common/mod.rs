#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use talkgen_api::auth::jwt::{generate_access_token, JwtConfig};
use talkgen_api::config::{ServerConfig, StorageBackend, StorageConfig};
use talkgen_api::poll_loops::PollLoops;
use talkgen_api::router::build_app_router;
use talkgen_api::state::AppState;
use talkgen_core::polling::PollConfig;
use talkgen_db::store::{JobStore, MemoryJobStore};
use talkgen_events::EventBus;
use talkgen_pipeline::{
    AssetPersister, FetchError, PollingDriver, Reconciler, SubmissionService,
};
use talkgen_provider::{
    DidConfig, ProviderError, ProviderStatus, StatusReport, SubmitRequest, SubmitResponse,
    VideoProvider,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Origin the fake provider is told to call back on.
pub const PUBLIC_BASE_URL: &str = "https://app.test";

/// Origin persisted videos are served from.
pub const MEDIA_BASE_URL: &str = "https://media.test";

/// Build a test `ServerConfig` with safe defaults.
///
/// Polling after submit is off so tests drive completion explicitly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url: None,
        public_base_url: Some(PUBLIC_BASE_URL.to_string()),
        provider: DidConfig {
            api_url: "http://provider.invalid".to_string(),
            api_key: "test-key".to_string(),
            elevenlabs_api_key: None,
            request_timeout: Duration::from_secs(5),
        },
        storage: StorageConfig {
            backend: StorageBackend::Local {
                root: "./unused-media".into(),
            },
            public_base_url: MEDIA_BASE_URL.to_string(),
        },
        poll: PollConfig::from_millis(0, 1, 3),
        poll_after_submit: false,
        jwt: JwtConfig {
            secret: "test-secret-for-api-integration-tests".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Scripted provider; unscripted calls succeed with a fresh job id or
/// report `started`.
#[derive(Default)]
pub struct FakeProvider {
    submit_script: Mutex<VecDeque<Result<SubmitResponse, ProviderError>>>,
    status_script: Mutex<VecDeque<Result<StatusReport, ProviderError>>>,
    pub submitted: Mutex<Vec<SubmitRequest>>,
}

impl FakeProvider {
    pub fn push_submit(&self, result: Result<SubmitResponse, ProviderError>) {
        self.submit_script.lock().unwrap().push_back(result);
    }

    pub fn push_status(&self, result: Result<StatusReport, ProviderError>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    /// Webhook URL sent with the most recent submission.
    pub fn last_webhook_url(&self) -> String {
        self.submitted
            .lock()
            .unwrap()
            .last()
            .and_then(|r| r.webhook_url.clone())
            .expect("a submission with a webhook URL")
    }
}

#[async_trait]
impl VideoProvider for FakeProvider {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        self.submitted.lock().unwrap().push(request.clone());
        let scripted = self.submit_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(SubmitResponse {
                provider_job_id: format!("tlk_{}", uuid::Uuid::new_v4().simple()),
            })
        })
    }

    async fn fetch_status(&self, _provider_job_id: &str) -> Result<StatusReport, ProviderError> {
        let scripted = self.status_script.lock().unwrap().pop_front();
        scripted.unwrap_or(Ok(StatusReport {
            status: ProviderStatus::Started,
            result_url: None,
            error: None,
        }))
    }
}

/// Persister whose next results can be scripted; defaults to success.
#[derive(Default)]
pub struct ScriptedPersister {
    script: Mutex<VecDeque<FetchError>>,
    pub persisted: Mutex<Vec<String>>,
}

impl ScriptedPersister {
    pub fn fail_next(&self, err: FetchError) {
        self.script.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl AssetPersister for ScriptedPersister {
    async fn persist(&self, remote_url: &str, destination_key: &str) -> Result<String, FetchError> {
        if let Some(err) = self.script.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.persisted.lock().unwrap().push(remote_url.to_string());
        Ok(format!("{MEDIA_BASE_URL}/{destination_key}"))
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// The router plus handles on every fake behind it.
pub struct TestApp {
    pub router: Router,
    pub config: ServerConfig,
    pub store: Arc<MemoryJobStore>,
    pub provider: Arc<FakeProvider>,
    pub persister: Arc<ScriptedPersister>,
    pub event_bus: Arc<EventBus>,
    pub poll_loops: Arc<PollLoops>,
    pub shutdown: CancellationToken,
}

impl TestApp {
    /// A fresh clone of the router for one `oneshot` request.
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Bearer header value for `owner_id`.
    pub fn bearer(&self, owner_id: &str) -> String {
        let token = generate_access_token(owner_id, &self.config.jwt).unwrap();
        format!("Bearer {token}")
    }
}

/// Build the full application router over in-memory fakes.
///
/// Uses the same [`build_app_router`] as `main.rs` so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(FakeProvider::default());
    let persister = Arc::new(ScriptedPersister::default());
    let event_bus = Arc::new(EventBus::default());

    let job_store: Arc<dyn JobStore> = store.clone();
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&job_store),
        persister.clone(),
        Arc::clone(&event_bus),
    ));
    let poller = Arc::new(PollingDriver::new(
        provider.clone(),
        Arc::clone(&job_store),
        Arc::clone(&reconciler),
    ));
    let submission = Arc::new(SubmissionService::new(
        Arc::clone(&job_store),
        provider.clone(),
        Arc::clone(&event_bus),
        config.public_base_url.clone(),
    ));

    let poll_loops = Arc::new(PollLoops::new());
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        store: job_store,
        submission,
        reconciler,
        poller,
        poll_loops: Arc::clone(&poll_loops),
        event_bus: Arc::clone(&event_bus),
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        config,
        store,
        provider,
        persister,
        event_bus,
        poll_loops,
        shutdown,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, bearer: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", bearer)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    post_raw(app, uri, body.to_string()).await
}

/// POST an arbitrary body with a JSON content type.
pub async fn post_raw(app: Router, uri: &str, body: String) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    bearer: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", bearer)
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_auth(app: Router, uri: &str, bearer: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", bearer)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// A valid create-job body speaking pre-recorded audio.
pub fn audio_job_body() -> serde_json::Value {
    serde_json::json!({
        "source_image_url": "https://cdn.test/face.png",
        "audio_url": "https://cdn.test/voice.mp3",
    })
}

/// Strip the public origin from a webhook URL, leaving path and query.
pub fn webhook_path(webhook_url: &str) -> String {
    webhook_url
        .strip_prefix(PUBLIC_BASE_URL)
        .expect("webhook URL on the public origin")
        .to_string()
}
