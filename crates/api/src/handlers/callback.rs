//! Provider webhook: `POST /video-callback/{job_id}?token=...`.
//!
//! The job id and token come from the per-job URL handed to the provider
//! at submission. The body is the provider's talk object; only the fields
//! that drive the job state machine are read.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use talkgen_core::callback::verify_callback_token;
use talkgen_core::types::JobId;
use talkgen_pipeline::{CompletionSource, ReconcileError, ReconcileOutcome, StatusObservation};
use talkgen_provider::ProviderStatus;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
}

/// Webhook body. Accepts both camelCase and snake_case spellings.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    #[serde(alias = "providerJobId", alias = "id")]
    pub provider_job_id: Option<String>,
    pub status: String,
    #[serde(default, alias = "resultUrl")]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// POST /video-callback/{job_id}?token={token}
///
/// | Result                          | Status |
/// |---------------------------------|--------|
/// | reconciled (incl. no-op)        | 200    |
/// | another writer is finalizing    | 202    |
/// | malformed or mismatched payload | 400    |
/// | bad or missing token            | 401    |
/// | unknown job                     | 404    |
/// | asset download failed           | 502    |
/// | asset storage failed            | 500    |
pub async fn video_callback(
    State(state): State<AppState>,
    Path(raw_job_id): Path<String>,
    Query(query): Query<CallbackQuery>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    // A malformed id cannot name a job.
    let job_id: JobId = raw_job_id
        .parse()
        .map_err(|_| ReconcileError::UnknownJob(raw_job_id.clone()))?;
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or(ReconcileError::Unauthorized)?;

    // Authenticate before touching the body.
    let job = state
        .store
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| ReconcileError::UnknownJob(job_id.to_string()))?;
    if !verify_callback_token(&token, &job.callback_token_hash) {
        tracing::warn!(job_id = %job_id, "Callback rejected: token mismatch");
        return Err(ReconcileError::Unauthorized.into());
    }

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed callback payload: {e}")))?;
    let status = ProviderStatus::parse(&payload.status).ok_or_else(|| {
        AppError::BadRequest(format!("Unknown provider status '{}'", payload.status))
    })?;
    let provider_job_id = payload
        .provider_job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Callback payload is missing the job id".into()))?;

    let observation = StatusObservation {
        provider_job_id,
        status,
        result_url: payload.result_url,
        error: payload.error,
    };

    tracing::info!(job_id = %job_id, provider_status = %status, "Received provider callback");

    let outcome = state
        .reconciler
        .reconcile(&observation, &CompletionSource::Webhook { job_id, token })
        .await?;

    let code = match outcome {
        ReconcileOutcome::Finalizing => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((code, Json(DataResponse { data: outcome })))
}
