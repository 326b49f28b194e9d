//! Document store abstraction.
//!
//! The hosted document database is modelled as two traits. `LedgerStore`
//! is the narrow seam the wallet ledger needs; `DocumentStore` adds the
//! collection-level reads and admin writes. Implementations:
//! - `MemoryStore`: in-process, used by tests and the `memory` backend
//! - `SqliteStore`: `sqlx` over SQLite

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::{
    AdminRecord, BookResult, Match, MatchPatch, NewMatch, Transaction, TransactionDraft,
    TransactionType, UserProfile, UserStatus, Wallet,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Wallet and transaction access used by the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read the wallet for a user. `None` if it was never created.
    async fn wallet(&self, user_id: &str) -> BookResult<Option<Wallet>>;

    /// Create a wallet with the given balance unless one already exists.
    /// Returns the stored wallet either way.
    async fn ensure_wallet(&self, user_id: &str, balance: Decimal) -> BookResult<Wallet>;

    /// Conditionally write a new balance and append its transaction record
    /// as one unit.
    ///
    /// `expected` is the balance the caller read (`None` meaning "no wallet
    /// yet"). If the stored value no longer matches, nothing is written and
    /// `Ok(None)` is returned.
    async fn commit_balance_change(
        &self,
        user_id: &str,
        expected: Option<Decimal>,
        new_balance: Decimal,
        record: TransactionDraft,
    ) -> BookResult<Option<Transaction>>;

    /// Transactions for one user, newest first.
    async fn transactions_for(&self, user_id: &str) -> BookResult<Vec<Transaction>>;
}

/// Full document-store surface: users, admins, matches and collection scans.
#[async_trait]
pub trait DocumentStore: LedgerStore {
    async fn admin_record(&self, uid: &str) -> BookResult<Option<AdminRecord>>;
    async fn put_admin(&self, record: AdminRecord) -> BookResult<()>;
    async fn admins(&self) -> BookResult<Vec<AdminRecord>>;

    async fn put_user(&self, profile: UserProfile) -> BookResult<()>;
    async fn users(&self) -> BookResult<Vec<UserProfile>>;
    async fn set_user_status(&self, user_id: &str, status: UserStatus) -> BookResult<UserProfile>;

    async fn matches(&self) -> BookResult<Vec<Match>>;
    async fn add_match(&self, new_match: NewMatch) -> BookResult<Match>;
    async fn update_match(&self, id: &str, patch: MatchPatch) -> BookResult<Match>;
    async fn delete_match(&self, id: &str) -> BookResult<()>;

    async fn wallets(&self) -> BookResult<Vec<Wallet>>;

    /// Append a record without touching any balance.
    async fn append_transaction(&self, record: TransactionDraft) -> BookResult<Transaction>;
    /// All transactions of one type across users, newest first.
    async fn transactions_of_kind(&self, kind: TransactionType) -> BookResult<Vec<Transaction>>;
    /// Every transaction, oldest first (export order).
    async fn all_transactions(&self) -> BookResult<Vec<Transaction>>;
}

/// Build a stored match from admin input, filling the id fields.
pub(crate) fn materialize_match(id: String, new_match: NewMatch, fallback_match_id: i64) -> Match {
    let label = new_match
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| format!("{} vs {}", new_match.team_a, new_match.team_b));
    Match {
        id,
        match_id: new_match.match_id.unwrap_or(fallback_match_id),
        sport: new_match.sport,
        label,
        team_a: new_match.team_a,
        team_b: new_match.team_b,
        time: new_match.time,
        date: None,
        league: new_match.league,
        odds: new_match.odds,
        status: new_match.status,
    }
}

/// Apply an admin patch in place.
pub(crate) fn apply_patch(m: &mut Match, patch: MatchPatch) {
    if let Some(odds) = patch.odds {
        m.odds = odds;
    }
    if let Some(status) = patch.status {
        m.status = status;
    }
}
