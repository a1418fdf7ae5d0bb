//! WildFire detonation connector
//!
//! Single-binary daemon that:
//! 1. Watches a spool directory for binaries
//! 2. Submits each to the WildFire service through the resilient client
//!    pipeline (key rotation, throttling, quota backoff)
//! 3. Polls for verdicts and persists reports for positive ones
//! 4. Serves operator endpoints (/health, /metrics)

mod config;
mod metrics;
mod spool;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use detonation::DetonationProvider;
use metrics_exporter_prometheus::PrometheusHandle;
use wildfire_client::{
    CredentialPool, HttpTransport, QuotaGate, RequestPipeline, SubmissionPoller, ThrottleWindow,
};

use crate::config::Config;

/// How many samples may sit queued between the scanner and the workers.
const SAMPLE_QUEUE_DEPTH: usize = 64;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    pipeline: Arc<RequestPipeline>,
    prometheus: PrometheusHandle,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(32))
        .with_state(state)
}

/// Health is driven by the pipeline snapshot: a connector without keys
/// cannot analyze anything and reports unhealthy.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.pipeline.snapshot();
    let status = if snapshot.keys_remaining > 0 {
        "healthy"
    } else {
        "unhealthy"
    };
    axum::Json(serde_json::json!({
        "status": status,
        "pipeline": snapshot,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.prometheus.render()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting wildfire-connector");

    // Install the Prometheus recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.wildfire.base_url,
        keys = config.wildfire.api_keys.len(),
        request_quota = ?config.wildfire.request_quota,
        throttle_per_minute = ?config.wildfire.throttle_per_minute,
        workers = config.daemon.workers,
        spool_dir = %config.daemon.spool_dir.display(),
        "configuration loaded"
    );

    std::fs::create_dir_all(&config.wildfire.report_dir).with_context(|| {
        format!(
            "failed to create report_dir {}",
            config.wildfire.report_dir.display()
        )
    })?;
    std::fs::create_dir_all(&config.daemon.spool_dir).with_context(|| {
        format!(
            "failed to create spool_dir {}",
            config.daemon.spool_dir.display()
        )
    })?;

    let mut client = reqwest::Client::builder();
    if !config.wildfire.verify_tls {
        warn!("TLS certificate verification disabled by configuration");
        client = client.danger_accept_invalid_certs(true);
    }
    let client = client.build().context("failed to build HTTP client")?;

    let transport = Arc::new(HttpTransport::new(
        client,
        config.wildfire.base_url.clone(),
    ));
    let pipeline = Arc::new(RequestPipeline::new(
        transport,
        CredentialPool::new(config.wildfire.api_keys.clone()),
        ThrottleWindow::new(config.wildfire.throttle_per_minute),
        QuotaGate::new(
            config.wildfire.request_quota,
            Duration::from_secs(config.wildfire.quota_reset_secs),
        ),
    ));
    let provider: Arc<dyn DetonationProvider> = Arc::new(SubmissionPoller::new(
        pipeline.clone(),
        config.wildfire.report_dir.clone(),
    ));

    let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_QUEUE_DEPTH);
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let _scanner = spool::spawn_scanner(
        config.daemon.spool_dir.clone(),
        Duration::from_secs(config.daemon.scan_interval_secs),
        sample_tx,
    );
    let _workers = workers::spawn_workers(config.daemon.workers, provider, sample_rx, fatal_tx);

    let app = build_router(AppState {
        pipeline,
        prometheus,
    });
    let listener = TcpListener::bind(config.daemon.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.daemon.listen_addr))?;
    info!(addr = %config.daemon.listen_addr, "status endpoint ready, accepting samples");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("status server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        Some(fatal) = fatal_rx.recv() => {
            // No valid API keys remain; nothing this process can do but stop.
            error!(error = %fatal, "fatal analysis error, exiting");
            std::process::exit(2);
        }
    }

    Ok(())
}
