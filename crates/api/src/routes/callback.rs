use axum::routing::post;
use axum::Router;

use crate::handlers::callback;
use crate::state::AppState;

/// Provider webhook routes (root level, authenticated by the per-job token).
pub fn router() -> Router<AppState> {
    Router::new().route("/video-callback/{job_id}", post(callback::video_callback))
}
