//! SQLite-backed document store (`sqlx`).
//!
//! Decimals are stored as TEXT to keep them exact, timestamps as RFC 3339
//! TEXT, nested payloads (odds, bet details) as JSON TEXT. The pool holds a
//! single connection, so a balance check-and-write inside one transaction
//! cannot interleave with another writer.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::{apply_patch, materialize_match, DocumentStore, LedgerStore};
use crate::types::{
    AdminRecord, BookError, BookResult, Match, MatchOdds, MatchPatch, NewMatch, Transaction,
    TransactionDraft, TransactionType, UserProfile, UserStatus, Wallet,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT,
        display_name TEXT,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS admins (
        uid TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        role TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS wallets (
        user_id TEXT PRIMARY KEY,
        balance TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS matches (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        match_id INTEGER NOT NULL,
        sport TEXT NOT NULL,
        label TEXT NOT NULL,
        team_a TEXT NOT NULL,
        team_b TEXT NOT NULL,
        time TEXT NOT NULL,
        date TEXT,
        league TEXT NOT NULL,
        odds TEXT NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        amount TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL,
        bet_details TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (user_id)",
];

impl From<sqlx::Error> for BookError {
    fn from(e: sqlx::Error) -> Self {
        BookError::ServiceUnavailable(format!("database: {e}"))
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    /// `sqlite::memory:` gives a private in-memory database.
    pub async fn connect(url: &str) -> BookResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        info!(url, "Document store opened");
        Ok(Self { pool })
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn parse_decimal(s: &str) -> BookResult<Decimal> {
    Decimal::from_str(s).map_err(|e| BookError::Malformed(format!("decimal {s:?}: {e}")))
}

fn parse_time(s: &str) -> BookResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BookError::Malformed(format!("timestamp {s:?}: {e}")))
}

fn user_from_row(row: &SqliteRow) -> BookResult<UserProfile> {
    Ok(UserProfile {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: parse_time(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn match_from_row(row: &SqliteRow) -> BookResult<Match> {
    let odds_json: String = row.try_get("odds")?;
    let odds: MatchOdds = serde_json::from_str(&odds_json)
        .map_err(|e| BookError::Malformed(format!("match odds: {e}")))?;
    let date = row
        .try_get::<Option<String>, _>("date")?
        .map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|e| BookError::Malformed(format!("match date {d:?}: {e}")))
        })
        .transpose()?;
    Ok(Match {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        sport: row.try_get("sport")?,
        label: row.try_get("label")?,
        team_a: row.try_get("team_a")?,
        team_b: row.try_get("team_b")?,
        time: row.try_get("time")?,
        date,
        league: row.try_get("league")?,
        odds,
        status: row.try_get::<String, _>("status")?.parse()?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> BookResult<Transaction> {
    let bet_details = row
        .try_get::<Option<String>, _>("bet_details")?
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| BookError::Malformed(format!("bet details: {e}")))
        })
        .transpose()?;
    Ok(Transaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: row.try_get::<String, _>("kind")?.parse()?,
        amount: parse_decimal(&row.try_get::<String, _>("amount")?)?,
        timestamp: parse_time(&row.try_get::<String, _>("timestamp")?)?,
        description: row.try_get("description")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        bet_details,
    })
}

fn odds_json(odds: &MatchOdds) -> BookResult<String> {
    serde_json::to_string(odds).map_err(|e| BookError::Malformed(format!("match odds: {e}")))
}

async fn insert_transaction<'e, E>(executor: E, record: TransactionDraft) -> BookResult<Transaction>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let tx = record.into_transaction(Uuid::new_v4().to_string(), Utc::now());
    let details = tx
        .bet_details
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| BookError::Malformed(format!("bet details: {e}")))?;

    sqlx::query(
        "INSERT INTO transactions (id, user_id, kind, amount, timestamp, description, status, bet_details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )
    .bind(tx.id.clone())
    .bind(tx.user_id.clone())
    .bind(tx.kind.to_string())
    .bind(tx.amount.to_string())
    .bind(tx.timestamp.to_rfc3339())
    .bind(tx.description.clone())
    .bind(tx.status.to_string())
    .bind(details)
    .execute(executor)
    .await?;

    Ok(tx)
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn wallet(&self, user_id: &str) -> BookResult<Option<Wallet>> {
        let balance: Option<String> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        balance
            .map(|b| -> BookResult<Wallet> {
                Ok(Wallet {
                    user_id: user_id.to_string(),
                    balance: parse_decimal(&b)?,
                })
            })
            .transpose()
    }

    async fn ensure_wallet(&self, user_id: &str, balance: Decimal) -> BookResult<Wallet> {
        sqlx::query("INSERT OR IGNORE INTO wallets (user_id, balance) VALUES (?1, ?2)")
            .bind(user_id)
            .bind(balance.to_string())
            .execute(&self.pool)
            .await?;
        self.wallet(user_id)
            .await?
            .ok_or_else(|| BookError::NotFound(format!("wallet {user_id}")))
    }

    async fn commit_balance_change(
        &self,
        user_id: &str,
        expected: Option<Decimal>,
        new_balance: Decimal,
        record: TransactionDraft,
    ) -> BookResult<Option<Transaction>> {
        let mut db_tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *db_tx)
                .await?;
        let current = current.as_deref().map(parse_decimal).transpose()?;

        if current != expected {
            debug!(user_id, ?expected, ?current, "Balance precondition failed");
            db_tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO wallets (user_id, balance) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET balance = excluded.balance",
        )
        .bind(user_id)
        .bind(new_balance.to_string())
        .execute(&mut *db_tx)
        .await?;

        let tx = insert_transaction(&mut *db_tx, record).await?;
        db_tx.commit().await?;
        Ok(Some(tx))
    }

    async fn transactions_for(&self, user_id: &str) -> BookResult<Vec<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE user_id = ?1 ORDER BY seq DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn admin_record(&self, uid: &str) -> BookResult<Option<AdminRecord>> {
        let row = sqlx::query("SELECT uid, email, role FROM admins WHERE uid = ?1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| -> BookResult<AdminRecord> {
            Ok(AdminRecord {
                uid: r.try_get("uid")?,
                email: r.try_get("email")?,
                role: r.try_get::<String, _>("role")?.parse()?,
            })
        })
        .transpose()
    }

    async fn put_admin(&self, record: AdminRecord) -> BookResult<()> {
        sqlx::query(
            "INSERT INTO admins (uid, email, role) VALUES (?1, ?2, ?3)
             ON CONFLICT(uid) DO UPDATE SET email = excluded.email, role = excluded.role",
        )
        .bind(&record.uid)
        .bind(&record.email)
        .bind(record.role.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn admins(&self) -> BookResult<Vec<AdminRecord>> {
        let rows = sqlx::query("SELECT uid, email, role FROM admins ORDER BY uid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| -> BookResult<AdminRecord> {
                Ok(AdminRecord {
                    uid: r.try_get("uid")?,
                    email: r.try_get("email")?,
                    role: r.try_get::<String, _>("role")?.parse()?,
                })
            })
            .collect()
    }

    async fn put_user(&self, profile: UserProfile) -> BookResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET email = excluded.email,
                display_name = excluded.display_name, status = excluded.status",
        )
        .bind(&profile.id)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.status.to_string())
        .bind(profile.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn users(&self) -> BookResult<Vec<UserProfile>> {
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn set_user_status(&self, user_id: &str, status: UserStatus) -> BookResult<UserProfile> {
        let result = sqlx::query("UPDATE users SET status = ?1 WHERE id = ?2")
            .bind(status.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookError::NotFound(format!("user {user_id}")));
        }
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        user_from_row(&row)
    }

    async fn matches(&self) -> BookResult<Vec<Match>> {
        let rows = sqlx::query("SELECT * FROM matches ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn add_match(&self, new_match: NewMatch) -> BookResult<Match> {
        let m = materialize_match(
            Uuid::new_v4().to_string(),
            new_match,
            Utc::now().timestamp_millis(),
        );
        sqlx::query(
            "INSERT INTO matches (id, match_id, sport, label, team_a, team_b, time, date, league, odds, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&m.id)
        .bind(m.match_id)
        .bind(&m.sport)
        .bind(&m.label)
        .bind(&m.team_a)
        .bind(&m.team_b)
        .bind(&m.time)
        .bind(m.date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&m.league)
        .bind(odds_json(&m.odds)?)
        .bind(m.status.to_string())
        .execute(&self.pool)
        .await?;
        Ok(m)
    }

    async fn update_match(&self, id: &str, patch: MatchPatch) -> BookResult<Match> {
        let mut db_tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT * FROM matches WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| BookError::NotFound(format!("match {id}")))?;
        let mut m = match_from_row(&row)?;
        apply_patch(&mut m, patch);

        sqlx::query("UPDATE matches SET odds = ?1, status = ?2 WHERE id = ?3")
            .bind(odds_json(&m.odds)?)
            .bind(m.status.to_string())
            .bind(id)
            .execute(&mut *db_tx)
            .await?;
        db_tx.commit().await?;
        Ok(m)
    }

    async fn delete_match(&self, id: &str) -> BookResult<()> {
        let result = sqlx::query("DELETE FROM matches WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BookError::NotFound(format!("match {id}")));
        }
        Ok(())
    }

    async fn wallets(&self) -> BookResult<Vec<Wallet>> {
        let rows = sqlx::query("SELECT user_id, balance FROM wallets ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| -> BookResult<Wallet> {
                Ok(Wallet {
                    user_id: r.try_get("user_id")?,
                    balance: parse_decimal(&r.try_get::<String, _>("balance")?)?,
                })
            })
            .collect()
    }

    async fn append_transaction(&self, record: TransactionDraft) -> BookResult<Transaction> {
        insert_transaction(&self.pool, record).await
    }

    async fn transactions_of_kind(&self, kind: TransactionType) -> BookResult<Vec<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions WHERE kind = ?1 ORDER BY seq DESC")
            .bind(kind.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    async fn all_transactions(&self) -> BookResult<Vec<Transaction>> {
        let rows = sqlx::query("SELECT * FROM transactions ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
