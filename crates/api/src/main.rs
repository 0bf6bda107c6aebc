//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::{Config, LogFormat};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{
    ChannelConfig, ChannelRegistry, DispatchConfig, InMemoryTaskQueue, NotificationDispatcher,
    PostgresTaskQueue, TaskQueue, WorkerConfig, WorkerPool,
};
use payments::{CredentialStore, GatewayConfig, HttpPaymentGateway};
use sqlx::postgres::PgPoolOptions;
use storage::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Starts the notification workers and serves HTTP until shutdown.
async fn serve<S: Store>(
    config: Config,
    store: S,
    queue: Arc<dyn TaskQueue>,
    metrics_handle: PrometheusHandle,
) {
    let channels = ChannelRegistry::from_config(&ChannelConfig::from_env())
        .expect("invalid notification channel configuration");
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        channels,
        DispatchConfig::from_env(),
    ));
    let workers = WorkerPool::spawn(WorkerConfig::from_env(), queue.clone(), dispatcher);

    let credentials = CredentialStore::from_env();
    if credentials.request_headers().is_err() {
        tracing::warn!("payment provider credentials are not configured");
    }
    let gateway = HttpPaymentGateway::new(GatewayConfig::from_env(), credentials.clone())
        .expect("failed to build payment provider client");

    let state = Arc::new(AppState::new(store, queue, gateway, credentials, &config));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    workers.shutdown().await;
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the backing store and queue, then serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to Postgres");
            let store = PostgresStore::new(pool.clone());
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using Postgres store");
            serve(config, store, Arc::new(PostgresTaskQueue::new(pool)), metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, running with in-memory store and queue");
            serve(
                config,
                InMemoryStore::new(),
                Arc::new(InMemoryTaskQueue::new()),
                metrics_handle,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}
