//! Integration tests for the Postgres-backed job store.
//!
//! These need a reachable database via `DATABASE_URL`; run them with
//! `cargo test -p talkgen-db -- --ignored`.

use assert_matches::assert_matches;
use sqlx::PgPool;
use talkgen_core::speech::{SpeechSpec, StyleParams};
use talkgen_db::models::status::VideoJobStatus;
use talkgen_db::models::video_job::{NewVideoJob, VideoJobListQuery};
use talkgen_db::store::{JobStore, PgJobStore, StoreError};

fn new_job() -> NewVideoJob {
    NewVideoJob {
        source_image_url: "https://cdn.test/face.png".into(),
        speech: SpeechSpec::Text {
            text: "Hello there".into(),
            voice_id: "rachel".into(),
        },
        style: StyleParams::default(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn create_and_find_round_trip(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.create("user-1", &new_job()).await.unwrap();

    assert_eq!(job.status(), VideoJobStatus::Created);
    let found = store.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(found.owner_id, "user-1");
    assert_eq!(found.speech_spec().unwrap(), new_job().speech);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn guarded_transitions_apply_once(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.create("u", &new_job()).await.unwrap();

    assert!(store.mark_submitted(job.id, "talk-1", "").await.unwrap());
    assert!(!store.mark_submitted(job.id, "talk-2", "").await.unwrap());
    assert!(store.record_progress(job.id, "started").await.unwrap());
    assert!(store.complete(job.id, "https://cdn/v.mp4").await.unwrap());
    assert!(!store.complete(job.id, "https://cdn/x.mp4").await.unwrap());
    assert!(!store
        .fail(job.id, "late", &serde_json::json!({}))
        .await
        .unwrap());

    let job = store.find_by_provider_job_id("talk-1").await.unwrap().unwrap();
    assert_eq!(job.status(), VideoJobStatus::Done);
    assert_eq!(job.result_url.as_deref(), Some("https://cdn/v.mp4"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn duplicate_provider_job_id_is_a_conflict(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let a = store.create("u", &new_job()).await.unwrap();
    let b = store.create("u", &new_job()).await.unwrap();

    store.mark_submitted(a.id, "talk-1", "").await.unwrap();
    let err = store.mark_submitted(b.id, "talk-1", "").await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(_));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn finalizing_claim_is_exclusive(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.create("u", &new_job()).await.unwrap();
    let stale_before = chrono::Utc::now() - chrono::Duration::minutes(5);

    let first = uuid::Uuid::new_v4();
    assert!(store
        .try_begin_finalizing(job.id, first, stale_before)
        .await
        .unwrap());
    assert!(!store
        .try_begin_finalizing(job.id, uuid::Uuid::new_v4(), stale_before)
        .await
        .unwrap());

    store.release_finalizing(job.id, first).await.unwrap();
    assert!(store
        .try_begin_finalizing(job.id, uuid::Uuid::new_v4(), stale_before)
        .await
        .unwrap());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn list_by_owner_only_returns_own_jobs(pool: PgPool) {
    let store = PgJobStore::new(pool);
    store.create("alice", &new_job()).await.unwrap();
    store.create("alice", &new_job()).await.unwrap();
    store.create("bob", &new_job()).await.unwrap();

    let jobs = store
        .list_by_owner("alice", &VideoJobListQuery::default())
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);
}
