//! Video job lifecycle: submission, polling, completion reconciliation
//! and asset persistence.
//!
//! - [`submission`] -- create jobs and hand them to the provider.
//! - [`poller`] -- drive a job to a terminal provider status by polling.
//! - [`reconciler`] -- apply webhook or poll observations to a job with
//!   compare-and-set semantics so exactly one writer finalizes it.
//! - [`fetcher`] -- copy the provider's temporary result into blob storage.

pub mod fetcher;
pub mod poller;
pub mod reconciler;
pub mod submission;

pub use fetcher::{AssetFetcher, AssetPersister, FetchError};
pub use poller::{PollError, PollOutcome, PollingDriver, Sleeper, TokioSleeper};
pub use reconciler::{
    CompletionSource, ReconcileError, ReconcileOutcome, Reconciler, StatusObservation,
    DEFAULT_FINALIZE_LEASE,
};
pub use submission::{SubmissionError, SubmissionService, DEFAULT_SUBMIT_LEASE};
