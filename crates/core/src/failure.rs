//! Failure classification and user-facing summaries.
//!
//! A failed job keeps the full structured [`ErrorDetail`] for diagnostics
//! while users see the single sentence returned by [`summarize`].

use serde::{Deserialize, Serialize};

/// Coarse failure categories across provider, storage and reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider throttled the request (HTTP 429).
    RateLimited,
    /// Provider refused the request as invalid.
    Rejected,
    /// Provider could not be reached or returned a 5xx.
    Unavailable,
    /// Provider reported the generation itself failed.
    GenerationError,
    /// Provider rejected the job after accepting it (e.g. moderation).
    GenerationRejected,
    /// The finished asset could not be downloaded.
    DownloadFailed,
    /// The finished asset could not be written to blob storage.
    StorageFailed,
}

impl FailureKind {
    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Rejected => "rejected",
            Self::Unavailable => "unavailable",
            Self::GenerationError => "generation_error",
            Self::GenerationRejected => "generation_rejected",
            Self::DownloadFailed => "download_failed",
            Self::StorageFailed => "storage_failed",
        }
    }
}

/// Human-readable one-line summary for a failure category.
pub fn summarize(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::RateLimited => "Rate limit exceeded, try later",
        FailureKind::Rejected => "The video request was rejected as invalid",
        FailureKind::Unavailable => "The video provider is unavailable, try later",
        FailureKind::GenerationError => "Video generation failed",
        FailureKind::GenerationRejected => "The video provider rejected this job",
        FailureKind::DownloadFailed => "The finished video could not be downloaded",
        FailureKind::StorageFailed => "The finished video could not be saved",
    }
}

/// Structured error payload stored on a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: FailureKind,
    /// Summary shown to the user.
    pub message: String,
    /// Raw error payload as reported by the provider, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<serde_json::Value>,
}

impl ErrorDetail {
    /// Detail with the default summary for `kind`.
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            message: summarize(kind).to_string(),
            provider_error: None,
        }
    }

    /// Attach the raw provider payload.
    pub fn with_provider_error(mut self, payload: Option<serde_json::Value>) -> Self {
        self.provider_error = payload.filter(|p| !p.is_null());
        self
    }

    /// Serialize into the JSON stored in `error_details`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
