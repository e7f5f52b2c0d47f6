//! Route definitions for the `/video-jobs` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::video_jobs;
use crate::state::AppState;

/// Routes mounted at `/video-jobs`.
///
/// ```text
/// GET    /                -> list_video_jobs
/// POST   /                -> create_video_job
/// GET    /{id}            -> get_video_job
/// POST   /{id}/submit     -> submit_video_job
/// POST   /{id}/poll       -> poll_video_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(video_jobs::list_video_jobs).post(video_jobs::create_video_job),
        )
        .route("/{id}", get(video_jobs::get_video_job))
        .route("/{id}/submit", post(video_jobs::submit_video_job))
        .route("/{id}/poll", post(video_jobs::poll_video_job))
}
