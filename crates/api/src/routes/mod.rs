pub mod callback;
pub mod health;
pub mod video_jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /video-jobs                  list, create + submit
/// /video-jobs/{id}             get
/// /video-jobs/{id}/submit      retry submission (POST)
/// /video-jobs/{id}/poll        start background polling (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/video-jobs", video_jobs::router())
}
