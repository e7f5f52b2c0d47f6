//! Video job entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use talkgen_core::speech::{SpeechSpec, StyleParams};
use talkgen_core::types::{JobId, Timestamp};

use crate::models::status::{StatusId, VideoJobStatus};

/// A row from the `video_jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VideoJob {
    pub id: JobId,
    pub owner_id: String,
    pub status_id: StatusId,
    pub provider_job_id: Option<String>,
    pub provider_status: Option<String>,
    pub source_image_url: String,
    pub speech: serde_json::Value,
    pub style: serde_json::Value,
    #[serde(skip_serializing)]
    pub callback_token_hash: String,
    /// Set while one submitter holds the right to call the provider.
    #[serde(skip_serializing)]
    pub submit_claimed_at: Option<Timestamp>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub poll_attempts: i32,
    #[serde(skip_serializing)]
    pub finalize_claim: Option<uuid::Uuid>,
    #[serde(skip_serializing)]
    pub finalize_claimed_at: Option<Timestamp>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VideoJob {
    /// Decoded lifecycle status.
    ///
    /// Unknown ids (which the foreign key prevents) decode as `Created`.
    pub fn status(&self) -> VideoJobStatus {
        VideoJobStatus::from_id(self.status_id).unwrap_or(VideoJobStatus::Created)
    }

    /// Whether the job has reached `Done` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Decode the stored speech source.
    pub fn speech_spec(&self) -> Result<SpeechSpec, serde_json::Error> {
        serde_json::from_value(self.speech.clone())
    }

    /// Decode the stored style parameters.
    pub fn style_params(&self) -> Result<StyleParams, serde_json::Error> {
        serde_json::from_value(self.style.clone())
    }
}

/// Insert DTO for a new job. The store assigns id, status and timestamps.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVideoJob {
    pub source_image_url: String,
    pub speech: SpeechSpec,
    #[serde(default)]
    pub style: StyleParams,
}

/// Query parameters for listing a user's jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoJobListQuery {
    pub status_id: Option<StatusId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;

impl VideoJobListQuery {
    /// Clamp `limit` to `1..=MAX_LIMIT`, defaulting to [`DEFAULT_LIMIT`].
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Non-negative offset, defaulting to zero.
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
