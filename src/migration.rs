//! One-shot copy of the document store into a relational database.
//!
//! Each run first writes a JSON backup of every collection to
//! `{backup_dir}/{unix_ms}/{collection}.json`, then migrates `users` (which
//! assigns the integer row ids) followed by `admins`, `wallets`, `matches`
//! and `transactions`. Records pointing at a user that did not migrate are
//! skipped and logged.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::store::DocumentStore;
use crate::types::{AdminRole, Transaction, TransactionStatus, TransactionType, UserStatus};

pub const DEFAULT_BATCH_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Target rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub auth_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetRow {
    Admin {
        user_id: i64,
        role: AdminRole,
    },
    Wallet {
        user_id: i64,
        balance: Decimal,
    },
    Match {
        match_id: i64,
        sport: String,
        label: String,
        team_a: String,
        team_b: String,
        time: String,
        league: String,
        /// Odds object as JSON text.
        odds: String,
        status: String,
    },
    Transaction {
        user_id: i64,
        kind: TransactionType,
        amount: Decimal,
        description: Option<String>,
        /// Bet details as JSON text.
        bet_details: Option<String>,
        status: TransactionStatus,
        created_at: DateTime<Utc>,
    },
}

/// Relational database receiving the migrated rows.
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Insert one user and return its new integer id.
    async fn insert_user(&self, row: &UserRow) -> Result<i64>;

    /// Insert a batch of rows as one unit. Returns the number inserted.
    async fn insert_rows(&self, rows: &[TargetRow]) -> Result<u64>;
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionReport {
    pub found: usize,
    pub migrated: u64,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub backup_dir: PathBuf,
    pub users: CollectionReport,
    pub admins: CollectionReport,
    pub wallets: CollectionReport,
    pub matches: CollectionReport,
    pub transactions: CollectionReport,
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

pub struct Migrator {
    source: Arc<dyn DocumentStore>,
    target: Arc<dyn MigrationTarget>,
    backup_root: PathBuf,
    batch_size: usize,
}

impl Migrator {
    pub fn new(
        source: Arc<dyn DocumentStore>,
        target: Arc<dyn MigrationTarget>,
        backup_root: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            target,
            backup_root: backup_root.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub async fn run(&self) -> Result<MigrationReport> {
        info!("Starting migration");

        let users = self.source.users().await.context("Failed to read users")?;
        let admins = self.source.admins().await.context("Failed to read admins")?;
        let wallets = self.source.wallets().await.context("Failed to read wallets")?;
        let matches = self.source.matches().await.context("Failed to read matches")?;
        let transactions = self
            .source
            .all_transactions()
            .await
            .context("Failed to read transactions")?;

        let backup_dir = self.backup_root.join(Utc::now().timestamp_millis().to_string());
        std::fs::create_dir_all(&backup_dir)
            .with_context(|| format!("Failed to create backup dir {}", backup_dir.display()))?;
        write_backup(&backup_dir, "users", &users)?;
        write_backup(&backup_dir, "admins", &admins)?;
        write_backup(&backup_dir, "wallets", &wallets)?;
        write_backup(&backup_dir, "matches", &matches)?;
        write_backup(&backup_dir, "transactions", &transactions)?;

        let mut report = MigrationReport {
            backup_dir,
            ..Default::default()
        };

        // Users first: every other collection refers to the new ids.
        let mut user_ids: HashMap<String, i64> = HashMap::new();
        report.users.found = users.len();
        for user in &users {
            let row = UserRow {
                auth_id: user.id.clone(),
                display_name: user.display_name.clone(),
                email: user.email.clone(),
                status: user.status,
                created_at: user.created_at,
            };
            match self.target.insert_user(&row).await {
                Ok(id) => {
                    user_ids.insert(user.id.clone(), id);
                    report.users.migrated += 1;
                }
                Err(e) => {
                    error!(uid = %user.id, error = %e, "Error inserting user");
                    report.users.skipped += 1;
                }
            }
        }
        info!(count = report.users.migrated, "Migrated users");

        let rows = admins
            .iter()
            .map(|a| match user_ids.get(&a.uid) {
                Some(&user_id) => Some(TargetRow::Admin { user_id, role: a.role }),
                None => {
                    error!(uid = %a.uid, "User not found for admin");
                    None
                }
            })
            .collect::<Vec<_>>();
        report.admins = self.migrate("admins", rows).await?;

        let rows = wallets
            .iter()
            .map(|w| match user_ids.get(&w.user_id) {
                Some(&user_id) => Some(TargetRow::Wallet {
                    user_id,
                    balance: w.balance,
                }),
                None => {
                    error!(user_id = %w.user_id, "User not found for wallet");
                    None
                }
            })
            .collect::<Vec<_>>();
        report.wallets = self.migrate("wallets", rows).await?;

        let rows = matches
            .iter()
            .map(|m| -> Result<Option<TargetRow>> {
                Ok(Some(TargetRow::Match {
                    match_id: m.match_id,
                    sport: m.sport.clone(),
                    label: m.label.clone(),
                    team_a: m.team_a.clone(),
                    team_b: m.team_b.clone(),
                    time: m.time.clone(),
                    league: m.league.clone(),
                    odds: serde_json::to_string(&m.odds).context("Failed to encode odds")?,
                    status: m.status.to_string(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        report.matches = self.migrate("matches", rows).await?;

        let rows = transactions
            .iter()
            .map(|t| transaction_row(t, &user_ids))
            .collect::<Result<Vec<_>>>()?;
        report.transactions = self.migrate("transactions", rows).await?;

        info!(
            users = report.users.migrated,
            admins = report.admins.migrated,
            wallets = report.wallets.migrated,
            matches = report.matches.migrated,
            transactions = report.transactions.migrated,
            "Migration completed"
        );
        Ok(report)
    }

    /// Insert the transformed rows of one collection in batches. `None`
    /// entries are records that were skipped during the transform.
    async fn migrate(&self, collection: &str, rows: Vec<Option<TargetRow>>) -> Result<CollectionReport> {
        let mut report = CollectionReport {
            found: rows.len(),
            ..Default::default()
        };

        for chunk in rows.chunks(self.batch_size) {
            let valid: Vec<TargetRow> = chunk.iter().flatten().cloned().collect();
            report.skipped += chunk.len() - valid.len();
            if valid.is_empty() {
                continue;
            }
            let inserted = self
                .target
                .insert_rows(&valid)
                .await
                .with_context(|| format!("Error inserting into {collection}"))?;
            info!(collection, rows = inserted, "Inserted batch");
            report.migrated += inserted;
        }

        info!(collection, total = report.migrated, "Collection migrated");
        Ok(report)
    }
}

fn transaction_row(t: &Transaction, user_ids: &HashMap<String, i64>) -> Result<Option<TargetRow>> {
    let Some(&user_id) = user_ids.get(&t.user_id) else {
        error!(user_id = %t.user_id, tx = %t.id, "User not found for transaction");
        return Ok(None);
    };
    let bet_details = t
        .bet_details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode bet details")?;
    Ok(Some(TargetRow::Transaction {
        user_id,
        kind: t.kind,
        amount: t.amount,
        description: Some(t.description.clone()).filter(|d| !d.is_empty()),
        bet_details,
        status: t.status,
        created_at: t.timestamp,
    }))
}

fn write_backup<T: Serialize>(dir: &Path, collection: &str, docs: &[T]) -> Result<()> {
    let path = dir.join(format!("{collection}.json"));
    let json = serde_json::to_string_pretty(docs)
        .with_context(|| format!("Failed to serialise {collection} backup"))?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write backup {}", path.display()))?;
    info!(collection, documents = docs.len(), "Backed up collection");
    Ok(())
}

// ---------------------------------------------------------------------------
// SQLite target
// ---------------------------------------------------------------------------

const TARGET_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        auth_id TEXT NOT NULL UNIQUE,
        display_name TEXT,
        email TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS admins (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wallets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        balance TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS matches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        match_id INTEGER NOT NULL,
        sport TEXT NOT NULL,
        match TEXT NOT NULL,
        team_a TEXT NOT NULL,
        team_b TEXT NOT NULL,
        time TEXT NOT NULL,
        league TEXT NOT NULL,
        odds TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        type TEXT NOT NULL,
        amount TEXT NOT NULL,
        description TEXT,
        bet_details TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

pub struct SqliteTarget {
    pool: SqlitePool,
}

impl SqliteTarget {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid target database url {url}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open target database")?;

        for stmt in TARGET_SCHEMA {
            sqlx::query(stmt)
                .execute(&pool)
                .await
                .context("Failed to create target schema")?;
        }
        Ok(Self { pool })
    }

    /// Row count of a target table.
    pub async fn count(&self, table: &str) -> Result<i64> {
        let allowed = ["users", "admins", "wallets", "matches", "transactions"];
        anyhow::ensure!(allowed.contains(&table), "unknown table {table}");
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {table}"))?;
        Ok(n)
    }
}

#[async_trait]
impl MigrationTarget for SqliteTarget {
    async fn insert_user(&self, row: &UserRow) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO users (auth_id, display_name, email, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&row.auth_id)
        .bind(&row.display_name)
        .bind(&row.email)
        .bind(row.status.to_string())
        .bind(row.created_at.to_rfc3339())
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert user {}", row.auth_id))?;
        Ok(result.last_insert_rowid())
    }

    async fn insert_rows(&self, rows: &[TargetRow]) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let mut db_tx = self.pool.begin().await.context("Failed to begin batch")?;
        let mut inserted = 0;

        for row in rows {
            let query = match row {
                TargetRow::Admin { user_id, role } => sqlx::query(
                    "INSERT INTO admins (user_id, role, created_at) VALUES (?1, ?2, ?3)",
                )
                .bind(*user_id)
                .bind(role.to_string())
                .bind(now.clone()),
                TargetRow::Wallet { user_id, balance } => sqlx::query(
                    "INSERT INTO wallets (user_id, balance, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)",
                )
                .bind(*user_id)
                .bind(balance.to_string())
                .bind(now.clone()),
                TargetRow::Match {
                    match_id,
                    sport,
                    label,
                    team_a,
                    team_b,
                    time,
                    league,
                    odds,
                    status,
                } => sqlx::query(
                    "INSERT INTO matches
                     (match_id, sport, match, team_a, team_b, time, league, odds, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                )
                .bind(*match_id)
                .bind(sport.clone())
                .bind(label.clone())
                .bind(team_a.clone())
                .bind(team_b.clone())
                .bind(time.clone())
                .bind(league.clone())
                .bind(odds.clone())
                .bind(status.clone())
                .bind(now.clone()),
                TargetRow::Transaction {
                    user_id,
                    kind,
                    amount,
                    description,
                    bet_details,
                    status,
                    created_at,
                } => sqlx::query(
                    "INSERT INTO transactions
                     (user_id, type, amount, description, bet_details, status, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .bind(*user_id)
                .bind(kind.to_string())
                .bind(amount.to_string())
                .bind(description.clone())
                .bind(bet_details.clone())
                .bind(status.to_string())
                .bind(created_at.to_rfc3339()),
            };
            inserted += query
                .execute(&mut *db_tx)
                .await
                .context("Failed to insert row")?
                .rows_affected();
        }

        db_tx.commit().await.context("Failed to commit batch")?;
        Ok(inserted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
