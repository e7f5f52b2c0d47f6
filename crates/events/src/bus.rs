//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. Only the writer that wins a
//! terminal transition publishes, so every job produces at most one
//! terminal event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talkgen_core::types::JobId;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A job finished and its video was persisted.
pub const EVENT_JOB_COMPLETED: &str = "video_job.completed";

/// A job failed terminally.
pub const EVENT_JOB_FAILED: &str = "video_job.failed";

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A lifecycle event for one video job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"video_job.completed"`.
    pub event_type: String,

    pub job_id: JobId,

    /// Owner of the job, for routing notifications.
    pub owner_id: String,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(event_type: impl Into<String>, job_id: JobId, owner_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id,
            owner_id: owner_id.into(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// `video_job.completed` carrying the durable result URL.
    pub fn completed(job_id: JobId, owner_id: &str, result_url: &str) -> Self {
        Self::new(EVENT_JOB_COMPLETED, job_id, owner_id)
            .with_payload(serde_json::json!({ "result_url": result_url }))
    }

    /// `video_job.failed` carrying the user-facing message and details.
    pub fn failed(
        job_id: JobId,
        owner_id: &str,
        message: &str,
        details: &serde_json::Value,
    ) -> Self {
        Self::new(EVENT_JOB_FAILED, job_id, owner_id).with_payload(serde_json::json!({
            "message": message,
            "details": details,
        }))
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        tracing::debug!(
            event_type = %event.event_type,
            job_id = %event.job_id,
            "Publishing job event",
        );
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
