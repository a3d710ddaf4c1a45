//! Burner relay binary.

use anyhow::{Context, Result};
use burner_core::config::AppConfig;
use burner_core::rules::RuleGroup;
use burner_relay::bootstrap::run_startup_migration;
use burner_relay::{AppState, Substrate, create_router};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Groups installed at startup. The override group waits for the first
/// injection or flag change.
const STARTUP_GROUPS: [RuleGroup; 2] = [RuleGroup::HeaderRewrite, RuleGroup::QuicSuppression];

/// Burner - background relay for the panel add-on
#[derive(Parser, Debug)]
#[command(name = "burnerd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "BURNER_CONFIG",
        default_value = "config/burnerd.toml"
    )]
    config: String,
}

/// Load configuration. The file is optional; `BURNER_` variables override it.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("BURNER_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Burner relay v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    burner_relay::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let stores = burner_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(
        synced = stores.synced.backend_name(),
        local = stores.local.backend_name(),
        "Key-value store initialized"
    );

    run_startup_migration(&stores).await;

    let substrate = Substrate::with_default_adapters().context("failed to build adapters")?;
    let state = AppState::new(config.clone(), stores, substrate);

    if !state.rules.apply_groups(&STARTUP_GROUPS).await {
        tracing::warn!("Some rule groups failed to install at startup");
    }

    let refresh_interval = config.update.refresh_interval();
    let refresh_handle = state.updater.clone().spawn_refresh_loop(refresh_interval);
    tracing::info!(
        interval_secs = refresh_interval.as_secs(),
        "Periodic refresh scheduled"
    );

    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh_handle.abort();
    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
