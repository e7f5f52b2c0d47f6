use std::sync::Arc;

use talkgen_db::store::JobStore;
use talkgen_events::EventBus;
use talkgen_pipeline::{PollingDriver, Reconciler, SubmissionService};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::poll_loops::PollLoops;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Video job persistence (Postgres or in-memory).
    pub store: Arc<dyn JobStore>,
    pub submission: Arc<SubmissionService>,
    pub reconciler: Arc<Reconciler>,
    pub poller: Arc<PollingDriver>,
    /// Background poll loops, at most one per job.
    pub poll_loops: Arc<PollLoops>,
    /// Job lifecycle events.
    pub event_bus: Arc<EventBus>,
    /// Cancelled on shutdown; background poll loops run on child tokens.
    pub shutdown: CancellationToken,
}
