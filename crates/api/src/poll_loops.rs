use std::collections::HashMap;
use std::sync::Arc;

use talkgen_core::polling::PollConfig;
use talkgen_core::types::JobId;
use talkgen_db::models::video_job::VideoJob;
use talkgen_pipeline::PollingDriver;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Tracks the background poll loop of each job so at most one runs per job.
///
/// Entries are removed by the loop itself when it finishes, whatever the
/// outcome. Designed to be wrapped in `Arc` and shared via `AppState`.
pub struct PollLoops {
    running: Mutex<HashMap<JobId, CancellationToken>>,
}

impl PollLoops {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a poll loop for `job` unless one is already running.
    ///
    /// The loop runs on a child of `parent`. Returns `false` when a loop
    /// for the job already exists and nothing was spawned.
    pub async fn start(
        self: &Arc<Self>,
        driver: &Arc<PollingDriver>,
        job: VideoJob,
        config: PollConfig,
        parent: &CancellationToken,
    ) -> bool {
        let cancel = {
            let mut running = self.running.lock().await;
            if running.contains_key(&job.id) {
                return false;
            }
            let cancel = parent.child_token();
            running.insert(job.id, cancel.clone());
            cancel
        };

        let loops = Arc::clone(self);
        let driver = Arc::clone(driver);
        tokio::spawn(async move {
            if let Err(e) = driver.run(&job, &config, &cancel).await {
                tracing::error!(job_id = %job.id, error = %e, "Polling loop failed");
            }
            loops.running.lock().await.remove(&job.id);
        });
        true
    }

    /// Whether a poll loop for `job_id` is currently running.
    pub async fn is_running(&self, job_id: JobId) -> bool {
        self.running.lock().await.contains_key(&job_id)
    }

    /// Number of running poll loops.
    pub async fn len(&self) -> usize {
        self.running.lock().await.len()
    }
}

impl Default for PollLoops {
    fn default() -> Self {
        Self::new()
    }
}
