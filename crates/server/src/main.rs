//! Greens marketplace API server.
//!
//! # Architecture
//!
//! - Axum HTTP API under `/api/v1`, JSON in and out
//! - `PostgreSQL` (sqlx) as the system of record, pgvector for embeddings
//! - Redis for rate-limit counters, the refresh-token blacklist and caches
//! - Optional OpenAI-compatible embedding provider for semantic search
//!
//! Migrations are NOT run on startup: `greens-cli migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use greens_server::cache::CacheStore;
use greens_server::config::AppConfig;
use greens_server::db;
use greens_server::routes;
use greens_server::state::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &AppConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry.sample_rate,
            traces_sample_rate: config.sentry.traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(config: &AppConfig) {
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "greens_server=info,tower_http=info".into());

    let fmt_layer = if config.environment.is_production() {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

/// `--config <path>`, else `GREENS_CONFIG`, else `config.yaml`.
fn config_path() -> PathBuf {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return PathBuf::from(path);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return PathBuf::from(path);
        }
    }
    std::env::var("GREENS_CONFIG").map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Log a fatal startup error and exit.
fn fatal(message: &str, error: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %error, "{message}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let config = match AppConfig::load(&config_path()) {
        Ok(config) => config,
        Err(e) => {
            // No subscriber yet; this is the only place the server writes to stderr.
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Failed to load configuration: {e}");
            }
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);
    init_tracing(&config);

    let connect_options = config
        .database
        .connect_options()
        .unwrap_or_else(|e| fatal("Invalid database configuration", &e));
    let pool = db::create_pool(connect_options, config.database.max_connections)
        .await
        .unwrap_or_else(|e| fatal("Failed to connect to PostgreSQL", &e));
    tracing::info!("Database pool created");

    let cache = CacheStore::connect(&config.redis)
        .await
        .unwrap_or_else(|e| fatal("Failed to connect to Redis", &e));
    tracing::info!("Redis connected");

    let addr = config.socket_addr();
    let grace = config.server.shutdown_grace;
    let semantic = config.embedding.is_some();

    let state = AppState::new(config, pool.clone(), cache)
        .unwrap_or_else(|e| fatal("Failed to initialize application state", &e));
    if !semantic {
        tracing::warn!("No embedding provider configured; semantic search uses keyword fallback");
    }

    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| fatal("Failed to bind to address", &e));
    tracing::info!("greens-server listening on {}", addr);

    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(());
    });

    let drain_deadline = async move {
        if signal_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = drain_deadline => {
            tracing::warn!(grace_secs = grace.as_secs(), "Shutdown grace period elapsed; dropping open connections");
        }
    }

    close_pool(&pool, Duration::from_secs(2)).await;
    tracing::info!("Shutdown complete");
}

async fn close_pool(pool: &sqlx::PgPool, limit: Duration) {
    if tokio::time::timeout(limit, pool.close()).await.is_err() {
        tracing::warn!("Timed out closing database pool");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
