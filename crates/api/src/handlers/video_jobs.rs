//! Handlers for the `/video-jobs` resource.
//!
//! All endpoints require authentication via [`AuthUser`]; callers only see
//! their own jobs.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use talkgen_core::error::CoreError;
use talkgen_core::speech::{SpeechSpec, StyleParams};
use talkgen_core::types::JobId;
use talkgen_db::models::video_job::{NewVideoJob, VideoJob, VideoJobListQuery};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /video-jobs`.
///
/// `audio_url` wins over `text`; `text` needs a `voice_id`; with neither
/// the avatar speaks the default filler line.
#[derive(Debug, Deserialize)]
pub struct CreateVideoJobRequest {
    pub source_image_url: String,
    pub audio_url: Option<String>,
    pub text: Option<String>,
    pub voice_id: Option<String>,
    #[serde(default)]
    pub style: StyleParams,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller owns it.
async fn find_and_authorize(
    state: &AppState,
    job_id: JobId,
    auth: &AuthUser,
    action: &str,
) -> AppResult<VideoJob> {
    let job = state
        .store
        .find_by_id(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "VideoJob",
            id: job_id.to_string(),
        }))?;

    if job.owner_id != auth.owner_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's video job"
        ))));
    }

    Ok(job)
}

/// Start a background polling loop for `job` unless one is running.
///
/// Returns `false` if a loop for the job already exists.
async fn spawn_poll_loop(state: &AppState, job: &VideoJob) -> bool {
    state
        .poll_loops
        .start(&state.poller, job.clone(), state.config.poll, &state.shutdown)
        .await
}

/// Start polling after a submission if configured to do so.
async fn start_polling(state: &AppState, job: &VideoJob) {
    if state.config.poll_after_submit && job.provider_job_id.is_some() {
        spawn_poll_loop(state, job).await;
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// POST /api/v1/video-jobs
///
/// Create a job and submit it to the provider. Returns 201 with the
/// submitted job. A provider rate limit answers 429 and leaves the job in
/// `created` for a later `POST /{id}/submit`.
pub async fn create_video_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateVideoJobRequest>,
) -> AppResult<impl IntoResponse> {
    let speech = SpeechSpec::resolve(input.audio_url, input.text, input.voice_id)?;
    let new_job = NewVideoJob {
        source_image_url: input.source_image_url,
        speech,
        style: input.style,
    };

    let job = state
        .submission
        .create_and_submit(&auth.owner_id, &new_job)
        .await?;
    start_polling(&state, &job).await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// List / Get
// ---------------------------------------------------------------------------

/// GET /api/v1/video-jobs
///
/// List the caller's jobs, newest first. Supports optional `status_id`,
/// `limit` and `offset` query parameters.
pub async fn list_video_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<VideoJobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.store.list_by_owner(&auth.owner_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/video-jobs/{id}
pub async fn get_video_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth, "view").await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Submit / Poll
// ---------------------------------------------------------------------------

/// POST /api/v1/video-jobs/{id}/submit
///
/// Retry submission of a job still in `created` (e.g. after a rate limit).
pub async fn submit_video_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    find_and_authorize(&state, job_id, &auth, "submit").await?;
    let job = state.submission.submit(job_id).await?;
    start_polling(&state, &job).await;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/video-jobs/{id}/poll
///
/// Start a background polling loop for a submitted job. Returns 202
/// immediately, also when a loop for the job is already running; a job
/// that is already terminal is returned with 200.
pub async fn poll_video_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state, job_id, &auth, "poll").await?;

    if job.is_terminal() {
        return Ok((StatusCode::OK, Json(DataResponse { data: job })));
    }
    if job.provider_job_id.is_none() {
        return Err(AppError::Poll(talkgen_pipeline::PollError::NotSubmitted(
            job.id,
        )));
    }

    if spawn_poll_loop(&state, &job).await {
        tracing::info!(job_id = %job.id, owner_id = %auth.owner_id, "Polling started on request");
    } else {
        tracing::debug!(job_id = %job.id, "Poll loop already running");
    }

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}
