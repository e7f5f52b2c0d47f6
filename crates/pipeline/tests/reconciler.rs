//! Reconciliation of webhook and poll observations.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{CountingPersister, Harness, PUBLIC_MEDIA_BASE};
use talkgen_db::models::status::VideoJobStatus;
use talkgen_db::store::JobStore;
use talkgen_events::bus::{EVENT_JOB_COMPLETED, EVENT_JOB_FAILED};
use talkgen_pipeline::{CompletionSource, ReconcileError, ReconcileOutcome, StatusObservation};
use talkgen_provider::ProviderStatus;

const REMOTE_URL: &str = "https://provider.test/tmp/result.mp4";

fn done(provider_job_id: &str) -> StatusObservation {
    StatusObservation {
        provider_job_id: provider_job_id.into(),
        status: ProviderStatus::Done,
        result_url: Some(REMOTE_URL.into()),
        error: None,
    }
}

fn with_status(provider_job_id: &str, status: ProviderStatus) -> StatusObservation {
    StatusObservation {
        provider_job_id: provider_job_id.into(),
        status,
        result_url: None,
        error: None,
    }
}

// ---------------------------------------------------------------------------
// Done path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn done_persists_asset_and_stores_durable_url() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    let mut events = h.event_bus.subscribe();

    let outcome = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();

    let expected = format!("{PUBLIC_MEDIA_BASE}/videos/{}.mp4", job.id);
    assert_eq!(
        outcome,
        ReconcileOutcome::Done {
            result_url: expected.clone()
        }
    );
    let stored = h.reload(&job).await;
    assert_eq!(stored.status(), VideoJobStatus::Done);
    assert_eq!(stored.result_url.as_deref(), Some(expected.as_str()));
    assert_ne!(stored.result_url.as_deref(), Some(REMOTE_URL));

    let persisted = h.persister.persisted.lock().unwrap().clone();
    assert_eq!(
        persisted,
        vec![(REMOTE_URL.to_string(), format!("videos/{}.mp4", job.id))]
    );

    let event = events.try_recv().unwrap();
    assert_eq!(event.event_type, EVENT_JOB_COMPLETED);
    assert_eq!(event.job_id, job.id);
    assert_eq!(event.payload["result_url"], expected.as_str());
}

#[tokio::test]
async fn repeated_done_is_idempotent() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    let mut events = h.event_bus.subscribe();

    let first = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();
    let second = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.persister.calls(), 1);
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err(), "only one completion event");
    assert_eq!(h.reload(&job).await.status(), VideoJobStatus::Done);
}

#[tokio::test]
async fn concurrent_done_observations_persist_once() {
    let h = Harness::with_persister(CountingPersister::slow(Duration::from_millis(50)));
    let (job, token) = h.submitted_job("tlk_race").await;
    let mut events = h.event_bus.subscribe();

    let mut handles = Vec::new();
    for i in 0..8 {
        let reconciler = Arc::clone(&h.reconciler);
        let source = if i % 2 == 0 {
            CompletionSource::Poll
        } else {
            CompletionSource::Webhook {
                job_id: job.id,
                token: token.clone(),
            }
        };
        handles.push(tokio::spawn(async move {
            reconciler.reconcile(&done("tlk_race"), &source).await
        }));
    }

    let mut done_count = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ReconcileOutcome::Done { .. } => done_count += 1,
            ReconcileOutcome::Finalizing => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert!(done_count >= 1);
    assert_eq!(h.persister.calls(), 1, "asset must be persisted exactly once");
    assert_eq!(h.reload(&job).await.status(), VideoJobStatus::Done);
    assert!(events.try_recv().is_ok());
    assert!(events.try_recv().is_err(), "only one completion event");
}

#[tokio::test]
async fn persist_failure_leaves_job_retryable() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    h.persister.fail_next(1);

    let err = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap_err();
    assert_matches!(err, ReconcileError::Persist(_));

    let stored = h.reload(&job).await;
    assert_eq!(stored.status(), VideoJobStatus::Submitted);
    assert!(stored.result_url.is_none());
    assert!(stored.finalize_claim.is_none(), "claim must be released");

    let outcome = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();
    assert_matches!(outcome, ReconcileOutcome::Done { .. });
    assert_eq!(h.persister.calls(), 2);
}

#[tokio::test]
async fn done_without_result_url_does_not_mutate() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;

    let err = h
        .reconciler
        .reconcile(
            &with_status("tlk_1", ProviderStatus::Done),
            &CompletionSource::Poll,
        )
        .await
        .unwrap_err();

    assert_matches!(err, ReconcileError::MissingResultUrl);
    assert_eq!(h.reload(&job).await.status(), VideoJobStatus::Submitted);
    assert_eq!(h.persister.calls(), 0);
}

#[tokio::test]
async fn live_finalize_claim_makes_others_wait() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    let stale_before = chrono::Utc::now() - chrono::Duration::minutes(5);
    assert!(h
        .store
        .try_begin_finalizing(job.id, uuid::Uuid::new_v4(), stale_before)
        .await
        .unwrap());

    let outcome = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Finalizing);
    assert_eq!(h.persister.calls(), 0);
}

// ---------------------------------------------------------------------------
// Failure and progress
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_status_fails_job_with_details() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    let mut events = h.event_bus.subscribe();
    let mut observation = with_status("tlk_1", ProviderStatus::Error);
    observation.error = Some(serde_json::json!({"kind": "FaceError"}));

    let outcome = h
        .reconciler
        .reconcile(&observation, &CompletionSource::Poll)
        .await
        .unwrap();

    assert_matches!(&outcome, ReconcileOutcome::Failed { message, details } => {
        assert_eq!(message, "Video generation failed");
        assert_eq!(details["provider_error"]["kind"], "FaceError");
    });
    let stored = h.reload(&job).await;
    assert_eq!(stored.status(), VideoJobStatus::Failed);
    assert!(stored.result_url.is_none());
    assert_eq!(events.try_recv().unwrap().event_type, EVENT_JOB_FAILED);
}

#[tokio::test]
async fn started_moves_job_to_processing() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;

    let outcome = h
        .reconciler
        .reconcile(
            &with_status("tlk_1", ProviderStatus::Started),
            &CompletionSource::Poll,
        )
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Processing);
    let stored = h.reload(&job).await;
    assert_eq!(stored.status(), VideoJobStatus::Processing);
    assert_eq!(stored.provider_status.as_deref(), Some("started"));
    assert!(stored.result_url.is_none());
}

#[tokio::test]
async fn terminal_job_ignores_contradicting_observation() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    h.reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();

    let outcome = h
        .reconciler
        .reconcile(
            &with_status("tlk_1", ProviderStatus::Error),
            &CompletionSource::Poll,
        )
        .await
        .unwrap();

    assert_matches!(outcome, ReconcileOutcome::Done { .. });
    let stored = h.reload(&job).await;
    assert_eq!(stored.status(), VideoJobStatus::Done);
    assert!(stored.error_message.is_none());
}

// ---------------------------------------------------------------------------
// Webhook authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_token_never_mutates() {
    let h = Harness::new();
    let (job, _) = h.submitted_job("tlk_1").await;
    let before = h.reload(&job).await;

    for observation in [
        done("tlk_1"),
        with_status("tlk_1", ProviderStatus::Error),
        with_status("tlk_1", ProviderStatus::Started),
    ] {
        let err = h
            .reconciler
            .reconcile(
                &observation,
                &CompletionSource::Webhook {
                    job_id: job.id,
                    token: "not-the-token".into(),
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, ReconcileError::Unauthorized);
    }

    let after = h.reload(&job).await;
    assert_eq!(after.status_id, before.status_id);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(h.persister.calls(), 0);
}

#[tokio::test]
async fn webhook_for_other_provider_job_is_rejected() {
    let h = Harness::new();
    let (job, token) = h.submitted_job("tlk_1").await;

    let err = h
        .reconciler
        .reconcile(
            &done("tlk_other"),
            &CompletionSource::Webhook {
                job_id: job.id,
                token,
            },
        )
        .await
        .unwrap_err();

    assert_matches!(err, ReconcileError::ProviderJobMismatch { .. });
    assert_eq!(h.reload(&job).await.status(), VideoJobStatus::Submitted);
}

#[tokio::test]
async fn unknown_job_is_reported() {
    let h = Harness::new();

    let err = h
        .reconciler
        .reconcile(&done("tlk_missing"), &CompletionSource::Poll)
        .await
        .unwrap_err();
    assert_matches!(err, ReconcileError::UnknownJob(_));

    let err = h
        .reconciler
        .reconcile(
            &done("tlk_missing"),
            &CompletionSource::Webhook {
                job_id: uuid::Uuid::now_v7(),
                token: "t".into(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ReconcileError::UnknownJob(_));
}

#[tokio::test]
async fn webhook_then_straggling_poll_is_a_no_op() {
    let h = Harness::new();
    let (job, token) = h.submitted_job("tlk_1").await;

    let via_webhook = h
        .reconciler
        .reconcile(
            &done("tlk_1"),
            &CompletionSource::Webhook {
                job_id: job.id,
                token,
            },
        )
        .await
        .unwrap();
    let completed = h.reload(&job).await;

    let via_poll = h
        .reconciler
        .reconcile(&done("tlk_1"), &CompletionSource::Poll)
        .await
        .unwrap();

    assert_eq!(via_webhook, via_poll);
    assert_eq!(h.persister.calls(), 1);
    let after = h.reload(&job).await;
    assert_eq!(after.result_url, completed.result_url);
    assert_eq!(after.completed_at, completed.completed_at);
}
