use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use talkgen_api::config::{ServerConfig, StorageBackend};
use talkgen_api::poll_loops::PollLoops;
use talkgen_api::router::build_app_router;
use talkgen_api::state::AppState;
use talkgen_db::store::{JobStore, MemoryJobStore, PgJobStore};
use talkgen_events::EventBus;
use talkgen_pipeline::{AssetFetcher, PollingDriver, Reconciler, SubmissionService};
use talkgen_provider::DidClient;
use talkgen_storage::{BlobStore, LocalBlobStore, S3BlobStore, S3Config};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "talkgen_api=debug,talkgen_pipeline=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    let store: Arc<dyn JobStore> = match &config.database_url {
        Some(database_url) => {
            let pool = talkgen_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            talkgen_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            talkgen_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgJobStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            Arc::new(MemoryJobStore::new())
        }
    };

    // --- Blob storage ---
    let blob_store: Arc<dyn BlobStore> = match &config.storage.backend {
        StorageBackend::Local { root } => {
            tracing::info!(root = %root.display(), "Using local blob storage");
            Arc::new(LocalBlobStore::new(
                root.clone(),
                config.storage.public_base_url.clone(),
            ))
        }
        StorageBackend::S3 {
            bucket,
            endpoint_url,
        } => {
            tracing::info!(bucket = %bucket, "Using S3 blob storage");
            Arc::new(
                S3BlobStore::from_env(S3Config {
                    bucket: bucket.clone(),
                    public_base_url: config.storage.public_base_url.clone(),
                    endpoint_url: endpoint_url.clone(),
                })
                .await,
            )
        }
    };

    // --- Provider + pipeline ---
    let http = reqwest::Client::builder()
        .timeout(config.provider.request_timeout)
        .build()
        .expect("Failed to build HTTP client");
    let provider = Arc::new(DidClient::with_client(http, config.provider.clone()));
    // Asset downloads can be large; they get their own client without the API timeout.
    let fetcher = Arc::new(AssetFetcher::new(reqwest::Client::new(), blob_store));

    let event_bus = Arc::new(EventBus::default());
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        fetcher,
        Arc::clone(&event_bus),
    ));
    let poller = Arc::new(PollingDriver::new(
        provider.clone(),
        Arc::clone(&store),
        Arc::clone(&reconciler),
    ));
    let submission = Arc::new(SubmissionService::new(
        Arc::clone(&store),
        provider,
        Arc::clone(&event_bus),
        config.public_base_url.clone(),
    ));
    if config.public_base_url.is_none() {
        tracing::warn!("PUBLIC_BASE_URL not set, completion relies on polling only");
    }

    // Log every lifecycle event.
    let event_log_handle = tokio::spawn(log_events(event_bus.subscribe()));

    // --- App state ---
    let shutdown = CancellationToken::new();
    let state = AppState {
        config: Arc::new(config.clone()),
        store,
        submission,
        reconciler,
        poller,
        poll_loops: Arc::new(PollLoops::new()),
        event_bus: Arc::clone(&event_bus),
        shutdown: shutdown.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Abandoned poll loops leave jobs in a resumable state.
    shutdown.cancel();
    tracing::info!("Poll loops cancelled");

    // Dropping the last sender closes the channel and ends the event logger.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), event_log_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Write each published job event to the log until the bus closes.
async fn log_events(mut rx: tokio::sync::broadcast::Receiver<talkgen_events::JobEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                job_id = %event.job_id,
                owner_id = %event.owner_id,
                payload = %event.payload,
                "Job event",
            ),
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event logger lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
