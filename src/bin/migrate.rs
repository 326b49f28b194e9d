//! One-shot migration of the document store into the relational database.
//!
//! Usage: `sportsbook-migrate [config.toml]`. Reads the source store from
//! `[store]`, writes to `[migration] target_url` and backs every collection
//! up under `[migration] backup_dir` first.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

use sportsbook::config::{AppConfig, StoreBackend};
use sportsbook::migration::{Migrator, SqliteTarget};
use sportsbook::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sportsbook=info")),
        )
        .with_target(true)
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load_or_default(&path)?;

    anyhow::ensure!(
        cfg.store.backend == StoreBackend::Sqlite,
        "Migration needs a persistent source store; set [store] backend = \"sqlite\""
    );

    let source = SqliteStore::connect(&cfg.store.database_url)
        .await
        .context("Failed to open source store")?;
    let target = SqliteTarget::connect(&cfg.migration.target_url).await?;

    let migrator = Migrator::new(
        Arc::new(source),
        Arc::new(target),
        &cfg.migration.backup_dir,
        cfg.migration.batch_size,
    );

    match migrator.run().await {
        Ok(report) => {
            info!(backup = %report.backup_dir.display(), "Migration completed successfully");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Migration failed");
            Err(e)
        }
    }
}
