//! REST client for the D-ID talks API.
//!
//! Wraps `POST /talks` (submission) and `GET /talks/{id}` (status) using
//! [`reqwest`]. Text scripts are voiced by ElevenLabs through D-ID's
//! external-provider support; the ElevenLabs key travels in the
//! `x-api-key-external` header.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use talkgen_core::speech::{SpeechSpec, StyleParams, DEFAULT_FILLER_TEXT, DEFAULT_FILLER_VOICE};

use crate::api::{ProviderStatus, StatusReport, SubmitRequest, SubmitResponse, VideoProvider};
use crate::error::{ProviderError, RequestKind};

/// Default D-ID API origin.
pub const DEFAULT_API_URL: &str = "https://api.d-id.com";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying third-party provider keys.
const EXTERNAL_KEY_HEADER: &str = "x-api-key-external";

/// Connection settings for the D-ID API.
#[derive(Debug, Clone)]
pub struct DidConfig {
    /// Base HTTP URL, e.g. `https://api.d-id.com`.
    pub api_url: String,
    /// D-ID API key, sent as `Authorization: Basic <key>`.
    pub api_key: String,
    /// ElevenLabs key for text scripts.
    pub elevenlabs_api_key: Option<String>,
    pub request_timeout: Duration,
}

/// HTTP client for the D-ID talks API.
pub struct DidClient {
    client: reqwest::Client,
    config: DidConfig,
}

/// Body of a successful `POST /talks`.
#[derive(Debug, Deserialize)]
struct TalkCreated {
    id: String,
}

/// Body of `GET /talks/{id}`.
#[derive(Debug, Deserialize)]
struct TalkStatus {
    status: String,
    #[serde(default)]
    result_url: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl DidClient {
    /// Create a client with its own connection pool.
    pub fn new(config: DidConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: DidConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header(
            reqwest::header::AUTHORIZATION,
            format!("Basic {}", self.config.api_key),
        )
    }

    /// Turn a non-2xx response into a classified [`ProviderError`].
    async fn ensure_success(
        response: reqwest::Response,
        kind: RequestKind,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::from_status(status.as_u16(), body, kind));
        }
        Ok(response)
    }
}

#[async_trait]
impl VideoProvider for DidClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError> {
        let body = build_talk_body(request);
        let mut builder = self.authorized(self.client.post(self.endpoint("/talks")));

        if let SpeechSpec::Text { .. } = request.speech {
            match &self.config.elevenlabs_api_key {
                Some(key) => {
                    let external = serde_json::json!({ "elevenlabs": key }).to_string();
                    builder = builder.header(EXTERNAL_KEY_HEADER, external);
                }
                None => tracing::warn!("Text script submitted without an ElevenLabs API key"),
            }
        }

        let response = builder.json(&body).send().await?;
        let response = Self::ensure_success(response, RequestKind::Submit).await?;
        let created: TalkCreated = response.json().await?;

        tracing::info!(
            provider_job_id = %created.id,
            speech = request.speech.kind(),
            webhook = request.webhook_url.is_some(),
            "Submitted talk to D-ID",
        );

        Ok(SubmitResponse {
            provider_job_id: created.id,
        })
    }

    async fn fetch_status(&self, provider_job_id: &str) -> Result<StatusReport, ProviderError> {
        let response = self
            .authorized(
                self.client
                    .get(self.endpoint(&format!("/talks/{provider_job_id}"))),
            )
            .send()
            .await?;
        let response = Self::ensure_success(response, RequestKind::FetchStatus).await?;
        let talk: TalkStatus = response.json().await?;

        let status = ProviderStatus::parse(&talk.status).ok_or_else(|| {
            ProviderError::Unavailable(format!("Unrecognized talk status '{}'", talk.status))
        })?;

        tracing::debug!(provider_job_id, %status, "Fetched D-ID talk status");

        Ok(StatusReport {
            status,
            result_url: talk.result_url,
            error: talk.error,
        })
    }
}

// ---- request body construction ----

/// Build the JSON body for `POST /talks`.
pub fn build_talk_body(request: &SubmitRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "source_url": request.source_url,
        "script": script_json(&request.speech),
        "config": config_json(&request.style),
    });
    if let Some(webhook) = &request.webhook_url {
        body["webhook"] = serde_json::Value::String(webhook.clone());
    }
    body
}

fn script_json(speech: &SpeechSpec) -> serde_json::Value {
    match speech {
        SpeechSpec::Audio { audio_url } => serde_json::json!({
            "type": "audio",
            "audio_url": audio_url,
        }),
        SpeechSpec::Text { text, voice_id } => serde_json::json!({
            "type": "text",
            "input": text,
            "provider": { "type": "elevenlabs", "voice_id": voice_id },
        }),
        SpeechSpec::Filler => serde_json::json!({
            "type": "text",
            "input": DEFAULT_FILLER_TEXT,
            "provider": { "type": "microsoft", "voice_id": DEFAULT_FILLER_VOICE },
        }),
    }
}

fn config_json(style: &StyleParams) -> serde_json::Value {
    let mut config = serde_json::json!({
        "stitch": style.stitch,
        "result_format": "mp4",
    });
    if let Some(expression) = &style.expression {
        config["driver_expressions"] = serde_json::json!({
            "expressions": [{
                "start_frame": 0,
                "expression": expression,
                "intensity": style.expression_intensity.unwrap_or(1.0),
            }],
        });
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(speech: SpeechSpec) -> SubmitRequest {
        SubmitRequest {
            source_url: "https://cdn.test/face.png".into(),
            speech,
            style: StyleParams::default(),
            webhook_url: None,
        }
    }

    #[test]
    fn audio_script_body() {
        let body = build_talk_body(&request(SpeechSpec::Audio {
            audio_url: "https://cdn.test/a.mp3".into(),
        }));
        assert_eq!(body["source_url"], "https://cdn.test/face.png");
        assert_eq!(body["script"]["type"], "audio");
        assert_eq!(body["script"]["audio_url"], "https://cdn.test/a.mp3");
        assert!(body.get("webhook").is_none());
    }

    #[test]
    fn text_script_routes_through_elevenlabs() {
        let body = build_talk_body(&request(SpeechSpec::Text {
            text: "Hi".into(),
            voice_id: "rachel".into(),
        }));
        assert_eq!(body["script"]["input"], "Hi");
        assert_eq!(body["script"]["provider"]["type"], "elevenlabs");
        assert_eq!(body["script"]["provider"]["voice_id"], "rachel");
    }

    #[test]
    fn filler_uses_default_utterance() {
        let body = build_talk_body(&request(SpeechSpec::Filler));
        assert_eq!(body["script"]["input"], DEFAULT_FILLER_TEXT);
        assert_eq!(body["script"]["provider"]["voice_id"], DEFAULT_FILLER_VOICE);
    }

    #[test]
    fn webhook_and_expression_are_forwarded() {
        let mut req = request(SpeechSpec::Filler);
        req.webhook_url = Some("https://svc.test/video-callback/1?token=t".into());
        req.style = StyleParams {
            stitch: true,
            expression: Some("happy".into()),
            expression_intensity: Some(0.5),
        };
        let body = build_talk_body(&req);
        assert_eq!(body["webhook"], "https://svc.test/video-callback/1?token=t");
        assert_eq!(body["config"]["stitch"], true);
        let expr = &body["config"]["driver_expressions"]["expressions"][0];
        assert_eq!(expr["expression"], "happy");
        assert_eq!(expr["intensity"], 0.5);
    }
}
