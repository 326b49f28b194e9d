//! Sportsbook API server.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the stores together and serves the HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use sportsbook::api;
use sportsbook::app::Sportsbook;
use sportsbook::betslip::FileSlipCache;
use sportsbook::config::{self, StoreBackend};
use sportsbook::feed::SportsDbFeed;
use sportsbook::session::MemoryAuth;
use sportsbook::store::{DocumentStore, MemoryStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("SPORTSBOOK_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::AppConfig::load_or_default(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        port = cfg.server.port,
        backend = ?cfg.store.backend,
        feed = %cfg.feed.base_url,
        "Sportsbook starting up"
    );

    let store: Arc<dyn DocumentStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::connect(&cfg.store.database_url)
                .await
                .context("Failed to open document store")?,
        ),
    };

    let cache = Arc::new(FileSlipCache::new(&cfg.betslip.cache_dir)?);
    let feed = Arc::new(SportsDbFeed::new(
        &cfg.feed.base_url,
        cfg.feed_api_key(),
        Duration::from_secs(cfg.feed.timeout_secs),
    )?);

    let app = Arc::new(Sportsbook::new(store, Arc::new(MemoryAuth::new()), cache, feed));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received.");
    };
    api::serve(app, cfg.server.port, shutdown).await?;

    info!("Sportsbook shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sportsbook=info,tower_http=info"));

    let json_logging = std::env::var("SPORTSBOOK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
