//! Provider-neutral request, response and status types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use talkgen_core::speech::{SpeechSpec, StyleParams};

use crate::error::ProviderError;

/// Status of a job as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Created,
    Started,
    Done,
    Error,
    Rejected,
}

impl ProviderStatus {
    /// Parse the provider's status string. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "started" => Some(Self::Started),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Done => "done",
            Self::Error => "error",
            Self::Rejected => "rejected",
        }
    }

    /// `done`, `error` and `rejected` end the provider-side job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Rejected)
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to start a generation.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Publicly reachable URL of the avatar image.
    pub source_url: String,
    pub speech: SpeechSpec,
    pub style: StyleParams,
    /// Where the provider should push the completion, if anywhere.
    pub webhook_url: Option<String>,
}

/// Returned by the provider once it accepted a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub provider_job_id: String,
}

/// One status observation for a provider job.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status: ProviderStatus,
    /// Temporary URL of the finished asset, present when `done`.
    pub result_url: Option<String>,
    /// Provider error payload, present on `error`/`rejected`.
    pub error: Option<serde_json::Value>,
}

/// The external video-generation API.
///
/// Implementations perform the outbound HTTP call only and never touch the
/// job store.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Start a generation and return the provider-side job id.
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, ProviderError>;

    /// Fetch the current status of a provider job.
    ///
    /// [`ProviderError::NotFound`] is expected shortly after submission.
    async fn fetch_status(&self, provider_job_id: &str) -> Result<StatusReport, ProviderError>;
}
