//! Chunkflow worker entrypoint.
//!
//! Reconciles the Weaviate schema, starts the embedding workers, and serves the HTTP surface
//! until interrupted. Workers finish the task in hand before the process exits.
use anyhow::{Context, Result};
use chunkflow::{
    api::{self, AppState},
    config, logging,
    metrics::PipelineMetrics,
    pipeline::EmbedTaskConsumer,
    providers::{DynamicEmbeddingClient, DynamicRerankClient},
    queue::{RetryPolicy, TaskQueue, WorkerPool},
    settings::{Settings, SettingsStore, SqliteSettingsStore},
    weaviate::{WeaviateChunkWriter, WeaviateService, ensure_schema},
};
use clap::Parser;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about = "Embed document chunks and index them in Weaviate")]
struct Cli {
    /// Number of queue workers (overrides WORKER_COUNT)
    #[arg(long)]
    workers: Option<usize>,

    /// HTTP port (overrides SERVER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Reconcile the Weaviate schema and exit
    #[arg(long, default_value_t = false)]
    reconcile_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing();

    let weaviate = Arc::new(
        WeaviateService::from_config().context("failed to initialize Weaviate client")?,
    );
    let report = ensure_schema(weaviate.as_ref(), &config.weaviate_class)
        .await
        .with_context(|| format!("failed to reconcile schema for class {}", config.weaviate_class))?;
    tracing::info!(
        class = %config.weaviate_class,
        created = report.created,
        added = ?report.added,
        "Schema reconciled"
    );
    if cli.reconcile_only {
        return Ok(());
    }

    let seed = Settings {
        gemini_api_key: config.gemini_api_key_seed.clone().unwrap_or_default(),
        ..Settings::default()
    };
    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettingsStore::open(&config.settings_db_path, seed)
            .with_context(|| format!("failed to open settings store at {}", config.settings_db_path))?,
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let writer = Arc::new(WeaviateChunkWriter::new(
        Arc::clone(&weaviate),
        config.weaviate_class.clone(),
    ));
    let embedder = Arc::new(DynamicEmbeddingClient::new(
        Arc::clone(&settings),
        config.providers.clone(),
    ));
    let reranker = Arc::new(DynamicRerankClient::new(
        Arc::clone(&settings),
        config.providers.clone(),
    ));
    let consumer = Arc::new(EmbedTaskConsumer::new(
        embedder,
        writer.clone(),
        Arc::clone(&metrics),
    ));

    let queue = Arc::new(TaskQueue::new(
        config.embed_task_topic.clone(),
        RetryPolicy {
            max_attempts: config.queue_max_attempts.max(1),
            base_backoff: Duration::from_millis(config.queue_retry_backoff_ms),
            ..RetryPolicy::default()
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::spawn(
        Arc::clone(&queue),
        consumer,
        Arc::clone(&metrics),
        cli.workers.unwrap_or(config.worker_count),
        shutdown_rx,
    );

    let app = api::create_router(AppState {
        settings,
        queue,
        reranker,
        writer,
        metrics,
    });
    let port = cli.port.unwrap_or(config.server_port);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    tracing::info!("Shutting down workers");
    let _ = shutdown_tx.send(true);
    pool.join().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
