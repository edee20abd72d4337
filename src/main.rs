//! release-gate - A password-gated proxy for private GitHub release assets
//!
//! This is the main entry point for the release-gate application.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use release_gate::auth::{AuthConfig, AuthManager};
use release_gate::config::Config;
use release_gate::otel::{init_tracing, Metrics, OtelProvider};
use release_gate::server::{AppState, Server};
use release_gate::store::{self, KvStore};
use release_gate::upstream::GitHubClient;

/// release-gate - A password-gated proxy for private GitHub release assets
#[derive(Parser, Debug)]
#[command(name = "release-gate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "RELEASE_GATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        repo = %config.upstream.repo,
        "Starting release-gate"
    );

    let store = build_store(&config).await;

    let auth_manager = Arc::new(AuthManager::new(
        AuthConfig::from_config(&config.auth),
        store,
    ));
    info!(
        rate_limiting = auth_manager.is_rate_limiting_enabled(),
        max_failed_attempts = config.auth.rate_limit.max_failed_attempts,
        "Authentication manager initialized"
    );

    let releases = Arc::new(GitHubClient::new(&config.upstream)?);
    info!(api_url = %config.upstream.api_url, "Upstream client initialized");

    let state = AppState {
        auth_manager,
        releases,
        metrics: Some(Arc::new(Metrics::new(&otel_provider.meter()))),
    };

    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("release-gate shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Connect the rate-limit store, if one is configured
///
/// A store that cannot be reached at startup leaves rate limiting disabled
/// rather than taking the service down.
async fn build_store(config: &Config) -> Option<Arc<dyn KvStore>> {
    let Some(store_config) = &config.store else {
        warn!("No store configured, failed-attempt rate limiting is disabled");
        return None;
    };

    match store::connect(store_config).await {
        Ok(store) => {
            info!(backend = store.name(), "Rate-limit store connected");
            Some(store)
        }
        Err(e) => {
            error!(error = %e, "Failed to connect rate-limit store, rate limiting is disabled");
            None
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
