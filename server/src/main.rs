//! Ficket server.
//!
//! This binary:
//! - Connects to Redis for queue, slot and seat lease state
//! - Subscribes to key expirations and runs the orphan sweep
//! - Serves the HTTP and WebSocket API
//!
//! # Usage
//!
//! ```bash
//! REDIS_URL=redis://127.0.0.1:6379 cargo run --bin ficket-server
//! ```

use anyhow::Context;
use ficket_core::environment::SystemClock;
use ficket_redis::{RedisExpiryFeed, RedisStore};
use ficket_runtime::metrics::MetricsRecorder;
use ficket_runtime::{ClientNotifier, ExpiryReactor};
use ficket_server::Config;
use ficket_web::{AppState, build_router};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ficket=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ficket server");

    let config = Config::from_env();
    info!(
        redis_database = config.redis.database,
        address = %config.bind_address(),
        "Configuration loaded"
    );

    let metrics = MetricsRecorder::install().context("Failed to install metrics recorder")?;

    let redis_url = config.redis.connection_url();
    let store = RedisStore::new(&redis_url).await.context("Failed to connect to Redis")?;
    let feed = RedisExpiryFeed::new(&redis_url)
        .context("Failed to create expiry feed")?
        .with_configure_notifications(config.redis.configure_notifications);
    info!(channel = %feed.channel(), "Redis connected");

    let state = AppState::new(store.clone(), Arc::new(SystemClock), config.service_config()).with_metrics(metrics);

    let shutdown = CancellationToken::new();
    let reactor = ExpiryReactor::new(store, ClientNotifier::new(state.registry().clone()));

    let reactor_task = {
        let reactor = reactor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { reactor.run(&feed, shutdown).await })
    };
    let sweeper_task = {
        let shutdown = shutdown.clone();
        let interval = config.sweep_interval();
        tokio::spawn(async move { reactor.run_sweeper(interval, shutdown).await })
    };
    info!("Expiry reactor started");

    let app = build_router(state);
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown.clone()));
    let mut serving = tokio::spawn(async move { server.await });

    // Open WebSocket channels keep the graceful drain waiting; bound it.
    let timeout = config.shutdown_timeout();
    let outcome = tokio::select! {
        outcome = &mut serving => {
            shutdown.cancel();
            Ok(outcome)
        }
        () = shutdown.cancelled() => tokio::time::timeout(timeout, &mut serving).await,
    };
    match outcome {
        Ok(Ok(Ok(()))) => info!("HTTP server stopped gracefully"),
        Ok(Ok(Err(e))) => warn!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => warn!(error = %e, "HTTP server task failed"),
        Err(_) => warn!(timeout_secs = timeout.as_secs(), "HTTP server shutdown timed out"),
    }

    for (name, task) in [("reactor", reactor_task), ("sweeper", sweeper_task)] {
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => info!(task = name, "Background task stopped"),
            Ok(Err(e)) => warn!(task = name, error = %e, "Background task failed"),
            Err(_) => warn!(task = name, "Background task shutdown timed out"),
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`.
///
/// Also returns when `shutdown` is cancelled elsewhere.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal, shutting down gracefully..."),
        () = terminate => info!("Received SIGTERM signal, shutting down gracefully..."),
        () = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}
