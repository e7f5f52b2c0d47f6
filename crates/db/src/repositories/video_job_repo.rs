//! Repository for the `video_jobs` table.
//!
//! Every lifecycle mutation is a single guarded `UPDATE` whose `WHERE`
//! clause encodes the allowed source states. Callers learn whether they won
//! the transition from the returned `bool` (rows affected).

use sqlx::PgPool;
use talkgen_core::types::{JobId, Timestamp};

use crate::models::status::{VideoJobStatus, TERMINAL_STATUSES};
use crate::models::video_job::{NewVideoJob, VideoJob, VideoJobListQuery};

/// Column list for `video_jobs` queries.
const COLUMNS: &str = "\
    id, owner_id, status_id, provider_job_id, provider_status, \
    source_image_url, speech, style, callback_token_hash, submit_claimed_at, \
    result_url, error_message, error_details, poll_attempts, \
    finalize_claim, finalize_claimed_at, \
    submitted_at, completed_at, created_at, updated_at";

/// Provides query operations for video generation jobs.
pub struct VideoJobRepo;

impl VideoJobRepo {
    // ── Queries ──────────────────────────────────────────────────────

    /// Insert a new job in `created` status, returning the row.
    pub async fn create(
        pool: &PgPool,
        id: JobId,
        owner_id: &str,
        input: &NewVideoJob,
    ) -> Result<VideoJob, sqlx::Error> {
        let speech = serde_json::to_value(&input.speech)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let style =
            serde_json::to_value(&input.style).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let query = format!(
            "INSERT INTO video_jobs (id, owner_id, status_id, source_image_url, speech, style) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(VideoJobStatus::Created.id())
            .bind(&input.source_image_url)
            .bind(speech)
            .bind(style)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its local id.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<VideoJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM video_jobs WHERE id = $1");
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by the provider-assigned id.
    pub async fn find_by_provider_job_id(
        pool: &PgPool,
        provider_job_id: &str,
    ) -> Result<Option<VideoJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM video_jobs WHERE provider_job_id = $1");
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(provider_job_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's jobs, newest first.
    pub async fn list_by_owner(
        pool: &PgPool,
        owner_id: &str,
        params: &VideoJobListQuery,
    ) -> Result<Vec<VideoJob>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM video_jobs \
             WHERE owner_id = $1 AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY created_at DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, VideoJob>(&query)
            .bind(owner_id)
            .bind(params.status_id)
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Claim the right to submit a `created` job, storing the digest of
    /// the callback token that will be sent with it.
    ///
    /// Succeeds when nobody holds the claim, or the existing claim was taken
    /// before `stale_before`.
    pub async fn try_begin_submitting(
        pool: &PgPool,
        id: JobId,
        token_hash: &str,
        stale_before: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET callback_token_hash = $2, submit_claimed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
               AND (submit_claimed_at IS NULL OR submit_claimed_at < $3)",
        )
        .bind(id)
        .bind(token_hash)
        .bind(stale_before)
        .bind(VideoJobStatus::Created.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop a submission claim, if it is still ours.
    pub async fn release_submitting(
        pool: &PgPool,
        id: JobId,
        token_hash: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE video_jobs SET submit_claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND callback_token_hash = $2 AND status_id = $3",
        )
        .bind(id)
        .bind(token_hash)
        .bind(VideoJobStatus::Created.id())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the provider job id and move `created -> submitted`.
    ///
    /// Only the submitter whose token digest is stored can commit.
    pub async fn mark_submitted(
        pool: &PgPool,
        id: JobId,
        provider_job_id: &str,
        token_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $3, provider_job_id = $2, submit_claimed_at = NULL, \
                 submitted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 AND callback_token_hash = $5",
        )
        .bind(id)
        .bind(provider_job_id)
        .bind(VideoJobStatus::Submitted.id())
        .bind(VideoJobStatus::Created.id())
        .bind(token_hash)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Progress ─────────────────────────────────────────────────────

    /// Move `submitted|processing -> processing` and store the provider status.
    pub async fn record_progress(
        pool: &PgPool,
        id: JobId,
        provider_status: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $3, provider_status = $2, updated_at = NOW() \
             WHERE id = $1 AND status_id IN ($4, $3)",
        )
        .bind(id)
        .bind(provider_status)
        .bind(VideoJobStatus::Processing.id())
        .bind(VideoJobStatus::Submitted.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count one poll attempt and optionally snapshot the provider status.
    ///
    /// Terminal jobs are left untouched.
    pub async fn record_poll(
        pool: &PgPool,
        id: JobId,
        provider_status: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE video_jobs \
             SET poll_attempts = poll_attempts + 1, \
                 provider_status = COALESCE($2, provider_status), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($3, $4)",
        )
        .bind(id)
        .bind(provider_status)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(())
    }

    // ── Finalization ─────────────────────────────────────────────────

    /// Claim the finalizing phase for a non-terminal job.
    ///
    /// Succeeds when nobody holds the claim, or the existing claim was taken
    /// before `stale_before`.
    pub async fn try_begin_finalizing(
        pool: &PgPool,
        id: JobId,
        claim: uuid::Uuid,
        stale_before: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET finalize_claim = $2, finalize_claimed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5) \
               AND (finalize_claim IS NULL OR finalize_claimed_at < $3)",
        )
        .bind(id)
        .bind(claim)
        .bind(stale_before)
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Drop a finalizing claim, if it is still ours.
    pub async fn release_finalizing(
        pool: &PgPool,
        id: JobId,
        claim: uuid::Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE video_jobs \
             SET finalize_claim = NULL, finalize_claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND finalize_claim = $2",
        )
        .bind(id)
        .bind(claim)
        .execute(pool)
        .await?;
        Ok(())
    }

    // ── Terminal transitions ─────────────────────────────────────────

    /// Mark a non-terminal job as done with its durable result URL.
    pub async fn complete(pool: &PgPool, id: JobId, result_url: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $3, result_url = $2, completed_at = NOW(), \
                 finalize_claim = NULL, finalize_claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($4, $5)",
        )
        .bind(id)
        .bind(result_url)
        .bind(VideoJobStatus::Done.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a non-terminal job as failed.
    pub async fn fail(
        pool: &PgPool,
        id: JobId,
        error_message: &str,
        error_details: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE video_jobs \
             SET status_id = $4, error_message = $2, error_details = $3, completed_at = NOW(), \
                 finalize_claim = NULL, finalize_claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id NOT IN ($5, $6)",
        )
        .bind(id)
        .bind(error_message)
        .bind(error_details)
        .bind(VideoJobStatus::Failed.id())
        .bind(TERMINAL_STATUSES[0])
        .bind(TERMINAL_STATUSES[1])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
