//! Farewell gift-claim server.
//!
//! Limited-inventory admission pipeline: synchronous decision against an
//! atomic stock counter, asynchronous durable confirmation.

use farewell_core::admission::AdmissionController;
use farewell_core::consumer::OutcomeProcessor;
use farewell_postgres::{PgApplicationStore, PgDeadLetterSink};
use farewell_redis::{RedisAdmissionLock, RedisCounterStore};
use farewell_redpanda::RedpandaOutcomeChannel;
use farewell_server::{AppState, Config, LogNotificationSender, OutcomeWorker, build_router};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    // RUST_LOG wins when set; otherwise the configured level applies.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Farewell gift-claim server");
    info!(
        redis_url = %config.redis.url,
        postgres_url = %config.postgres.url,
        redpanda_brokers = %config.redpanda.brokers,
        outcome_topic = %config.redpanda.outcome_topic,
        "Configuration loaded"
    );

    // Metrics exporter
    let metrics_addr: std::net::SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    info!(address = %metrics_addr, "Metrics exporter listening");

    // Redis: counter + admission locks
    info!("Connecting to Redis...");
    let redis_conn = farewell_redis::connect(&config.redis.url).await?;
    let counter = Arc::new(RedisCounterStore::new(redis_conn.clone()));
    let lock = Arc::new(RedisAdmissionLock::new(redis_conn));
    info!("Redis connected");

    // Postgres: application records + dead letters
    info!("Connecting to Postgres...");
    let pool = farewell_postgres::connect(&config.postgres.url, config.postgres.max_connections)
        .await?;
    farewell_postgres::ensure_schema(&pool).await?;
    let applications = Arc::new(PgApplicationStore::new(pool.clone()));
    let dead_letters = Arc::new(PgDeadLetterSink::new(pool));
    info!("Postgres connected");

    // RedPanda: outcome channel shared by both sides
    info!("Connecting to RedPanda...");
    let channel = Arc::new(
        RedpandaOutcomeChannel::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .build()?,
    );
    info!("RedPanda connected");

    let admission = Arc::new(AdmissionController::new(
        counter.clone(),
        lock,
        channel.clone(),
        config.redis.stock_key.clone(),
        config.redpanda.outcome_topic.clone(),
        config.admission_policy(),
    ));

    let processor = Arc::new(OutcomeProcessor::new(
        applications.clone(),
        Arc::new(LogNotificationSender),
        channel.clone(),
        dead_letters,
        config.redpanda.outcome_topic.clone(),
        config.retry_policy(),
    ));

    // Outcome worker with broadcast shutdown
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let worker = OutcomeWorker::new(
        channel,
        processor,
        config.redpanda.outcome_topic.clone(),
        shutdown_rx,
    );
    let worker_handle = tokio::spawn(worker.run());
    info!("Outcome worker started");

    let state = AppState::new(
        admission,
        applications,
        counter,
        config.redis.stock_key.clone(),
        config.server.admin_key.clone(),
    );
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the worker after the HTTP side has drained.
    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
