//! `ingestd` — the Facthouse ingestion service.
//!
//! ## Configuration
//!
//! Flags:
//! - `--port`: HTTP port (default 8080)
//! - `--base-dir`: base directory for the buffer and, with the local
//!   backend, raw storage (default `./data`)
//!
//! Environment:
//! - `API_KEY`: shared secret for `X-API-Key`; absent disables auth
//! - `S3_ENDPOINT` / `S3_REGION` / `S3_BUCKET` / `S3_ACCESS_KEY` /
//!   `S3_SECRET_KEY`: presence of `S3_ENDPOINT` selects the S3-compatible
//!   backend, otherwise raw batches land on the local filesystem under
//!   `<base-dir>/raw`
//! - `RUST_LOG`: log filter (default `info`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use facthouse_ingest::{create_router, AppState, DurableSink, RateLimiter, SinkConfig};
use facthouse_storage::{BlobStore, LocalStore, S3Config, S3Store};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_WINDOW: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "ingestd", about = "Facthouse ingestion service", long_about = None)]
struct Args {
    /// HTTP port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Base directory for buffer and raw storage
    #[arg(long, default_value = "./data")]
    base_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    facthouse_observability::register_metrics();

    let args = Args::parse();

    let api_key = std::env::var("API_KEY").ok().filter(|key| !key.is_empty());
    match &api_key {
        Some(_) => info!("API key authentication enabled"),
        None => warn!("API_KEY not set; authentication disabled"),
    }

    let cancel = CancellationToken::new();

    let store: Arc<dyn BlobStore> = match std::env::var("S3_ENDPOINT") {
        Ok(endpoint) if !endpoint.is_empty() => {
            info!(endpoint = %endpoint, "initializing S3-compatible object store");
            Arc::new(
                S3Store::new(
                    S3Config {
                        endpoint,
                        region: std::env::var("S3_REGION").unwrap_or_default(),
                        bucket: std::env::var("S3_BUCKET").unwrap_or_default(),
                        access_key: std::env::var("S3_ACCESS_KEY").unwrap_or_default(),
                        secret_key: std::env::var("S3_SECRET_KEY").unwrap_or_default(),
                    },
                    cancel.clone(),
                )
                .context("failed to initialize S3 store")?,
            )
        }
        _ => {
            let raw_dir = args.base_dir.join("raw");
            info!(path = %raw_dir.display(), "initializing local object store");
            Arc::new(LocalStore::new(&raw_dir).context("failed to initialize local store")?)
        }
    };

    let buffer_dir = args.base_dir.join("buffer");
    info!(path = %buffer_dir.display(), "initializing durable sink");
    let sink = Arc::new(
        DurableSink::new(SinkConfig::new(buffer_dir), store).context("failed to create sink")?,
    );

    // 100 requests/sec steady state, burst of 200, shared by all endpoints.
    let limiter = RateLimiter::new(100, 200);
    let refill = limiter.start_refill(cancel.clone());

    let app = create_router(AppState {
        sink: sink.clone(),
        limiter,
        api_key,
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "starting ingestion service");

    let drain = cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(drain.cancelled_owned())
            .await
    });

    tokio::select! {
        signal = shutdown_signal() => {
            info!(signal, "received shutdown signal, draining connections");
            cancel.cancel();
            match tokio::time::timeout(DRAIN_WINDOW, &mut server).await {
                Ok(result) => result.context("server task panicked")?.context("server error")?,
                Err(_) => {
                    warn!("drain window expired, aborting remaining connections");
                    server.abort();
                }
            }
        }
        result = &mut server => {
            cancel.cancel();
            result.context("server task panicked")?.context("server error")?;
        }
    }

    sink.close().await;
    let _ = refill.await;
    info!("server stopped gracefully");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    }
}
