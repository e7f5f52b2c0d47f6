use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use talkgen_core::error::CoreError;
use talkgen_core::failure::summarize;
use talkgen_db::store::StoreError;
use talkgen_pipeline::{FetchError, PollError, ReconcileError, SubmissionError};
use talkgen_provider::ProviderError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and pipeline errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `talkgen_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A job store error.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Poll(#[from] PollError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core(core),
            AppError::Store(err) => classify_store(err),
            AppError::Submission(err) => classify_submission(err),
            AppError::Reconcile(err) => classify_reconcile(err),
            AppError::Poll(err) => match err {
                PollError::NotSubmitted(id) => (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Video job {id} has not been submitted yet"),
                ),
                PollError::Provider(e) => classify_provider(e),
                PollError::Reconcile(e) => classify_reconcile(e),
                PollError::Store(e) => classify_store(e),
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core(core: &CoreError) -> Classified {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

/// - Uniqueness conflicts map to 409.
/// - Database failures map to 500 with a sanitized message.
fn classify_store(err: &StoreError) -> Classified {
    match err {
        StoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        StoreError::Database(db_err) => {
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
    }
}

/// Provider failures carry the user-facing summary, never the raw body.
fn classify_provider(err: &ProviderError) -> Classified {
    tracing::warn!(error = %err, "Provider error");
    let message = err.summary().to_string();
    match err {
        ProviderError::RateLimited { .. } => {
            (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", message)
        }
        ProviderError::Rejected { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "PROVIDER_REJECTED",
            message,
        ),
        ProviderError::NotFound(_) | ProviderError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "PROVIDER_UNAVAILABLE",
            message,
        ),
    }
}

fn classify_submission(err: &SubmissionError) -> Classified {
    match err {
        SubmissionError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("VideoJob with id {id} not found"),
        ),
        SubmissionError::InvalidState { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATE", err.to_string())
        }
        SubmissionError::InProgress(_) => (
            StatusCode::CONFLICT,
            "SUBMISSION_IN_PROGRESS",
            err.to_string(),
        ),
        SubmissionError::Core(core) => classify_core(core),
        SubmissionError::Provider(e) => classify_provider(e),
        SubmissionError::Store(e) => classify_store(e),
        SubmissionError::CorruptParameters(e) => {
            tracing::error!(error = %e, "Stored job parameters failed to decode");
            internal()
        }
    }
}

/// Webhook outcomes: 401 token, 404 job, 400 payload, 502 download, 500 storage.
fn classify_reconcile(err: &ReconcileError) -> Classified {
    match err {
        ReconcileError::UnknownJob(_) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Video job not found".to_string(),
        ),
        ReconcileError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Invalid callback token".to_string(),
        ),
        ReconcileError::ProviderJobMismatch { .. } => (
            StatusCode::BAD_REQUEST,
            "PROVIDER_JOB_MISMATCH",
            "Payload does not belong to this job".to_string(),
        ),
        ReconcileError::MissingResultUrl => (
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "Completed status without a result URL".to_string(),
        ),
        ReconcileError::Persist(e) => {
            tracing::error!(error = %e, "Asset persistence failed");
            match e {
                FetchError::DownloadFailed(_) => (
                    StatusCode::BAD_GATEWAY,
                    "DOWNLOAD_FAILED",
                    summarize(e.kind()).to_string(),
                ),
                FetchError::StorageFailed(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_FAILED",
                    summarize(e.kind()).to_string(),
                ),
            }
        }
        ReconcileError::Store(e) => classify_store(e),
    }
}
