//! In-memory document store.
//!
//! All collections live behind a single `RwLock`, so a balance write and
//! its transaction record are applied together. `set_offline` makes every
//! call fail with `ServiceUnavailable`, which is how tests exercise the
//! "remote unreachable" paths.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{apply_patch, materialize_match, DocumentStore, LedgerStore};
use crate::types::{
    AdminRecord, BookError, BookResult, Match, MatchPatch, NewMatch, Transaction,
    TransactionDraft, TransactionType, UserProfile, UserStatus, Wallet,
};

#[derive(Default)]
struct Collections {
    users: HashMap<String, UserProfile>,
    admins: HashMap<String, AdminRecord>,
    wallets: HashMap<String, Decimal>,
    matches: Vec<Match>,
    /// Append-only, in insertion order.
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the remote service becoming (un)reachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> BookResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BookError::ServiceUnavailable("document store offline".into()))
        } else {
            Ok(())
        }
    }

    fn stamp(record: TransactionDraft) -> Transaction {
        record.into_transaction(Uuid::new_v4().to_string(), Utc::now())
    }
}

fn newest_first(mut txs: Vec<Transaction>) -> Vec<Transaction> {
    // Stable sort keeps insertion order for equal timestamps; reverse after.
    txs.sort_by_key(|t| t.timestamp);
    txs.reverse();
    txs
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn wallet(&self, user_id: &str) -> BookResult<Option<Wallet>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        Ok(inner.wallets.get(user_id).map(|b| Wallet {
            user_id: user_id.to_string(),
            balance: *b,
        }))
    }

    async fn ensure_wallet(&self, user_id: &str, balance: Decimal) -> BookResult<Wallet> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let stored = *inner.wallets.entry(user_id.to_string()).or_insert(balance);
        Ok(Wallet {
            user_id: user_id.to_string(),
            balance: stored,
        })
    }

    async fn commit_balance_change(
        &self,
        user_id: &str,
        expected: Option<Decimal>,
        new_balance: Decimal,
        record: TransactionDraft,
    ) -> BookResult<Option<Transaction>> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let current = inner.wallets.get(user_id).copied();
        if current != expected {
            debug!(user_id, ?expected, ?current, "Balance precondition failed");
            return Ok(None);
        }
        inner.wallets.insert(user_id.to_string(), new_balance);
        let tx = Self::stamp(record);
        inner.transactions.push(tx.clone());
        Ok(Some(tx))
    }

    async fn transactions_for(&self, user_id: &str) -> BookResult<Vec<Transaction>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let txs = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(txs))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn admin_record(&self, uid: &str) -> BookResult<Option<AdminRecord>> {
        self.check_online()?;
        Ok(self.inner.read().await.admins.get(uid).cloned())
    }

    async fn put_admin(&self, record: AdminRecord) -> BookResult<()> {
        self.check_online()?;
        self.inner.write().await.admins.insert(record.uid.clone(), record);
        Ok(())
    }

    async fn admins(&self) -> BookResult<Vec<AdminRecord>> {
        self.check_online()?;
        let mut admins: Vec<_> = self.inner.read().await.admins.values().cloned().collect();
        admins.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(admins)
    }

    async fn put_user(&self, profile: UserProfile) -> BookResult<()> {
        self.check_online()?;
        self.inner.write().await.users.insert(profile.id.clone(), profile);
        Ok(())
    }

    async fn users(&self) -> BookResult<Vec<UserProfile>> {
        self.check_online()?;
        let mut users: Vec<_> = self.inner.read().await.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_user_status(&self, user_id: &str, status: UserStatus) -> BookResult<UserProfile> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| BookError::NotFound(format!("user {user_id}")))?;
        user.status = status;
        Ok(user.clone())
    }

    async fn matches(&self) -> BookResult<Vec<Match>> {
        self.check_online()?;
        Ok(self.inner.read().await.matches.clone())
    }

    async fn add_match(&self, new_match: NewMatch) -> BookResult<Match> {
        self.check_online()?;
        let m = materialize_match(
            Uuid::new_v4().to_string(),
            new_match,
            Utc::now().timestamp_millis(),
        );
        self.inner.write().await.matches.push(m.clone());
        Ok(m)
    }

    async fn update_match(&self, id: &str, patch: MatchPatch) -> BookResult<Match> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let m = inner
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| BookError::NotFound(format!("match {id}")))?;
        apply_patch(m, patch);
        Ok(m.clone())
    }

    async fn delete_match(&self, id: &str) -> BookResult<()> {
        self.check_online()?;
        let mut inner = self.inner.write().await;
        let before = inner.matches.len();
        inner.matches.retain(|m| m.id != id);
        if inner.matches.len() == before {
            return Err(BookError::NotFound(format!("match {id}")));
        }
        Ok(())
    }

    async fn wallets(&self) -> BookResult<Vec<Wallet>> {
        self.check_online()?;
        let mut wallets: Vec<_> = self
            .inner
            .read()
            .await
            .wallets
            .iter()
            .map(|(user_id, balance)| Wallet {
                user_id: user_id.clone(),
                balance: *balance,
            })
            .collect();
        wallets.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(wallets)
    }

    async fn append_transaction(&self, record: TransactionDraft) -> BookResult<Transaction> {
        self.check_online()?;
        let tx = Self::stamp(record);
        self.inner.write().await.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn transactions_of_kind(&self, kind: TransactionType) -> BookResult<Vec<Transaction>> {
        self.check_online()?;
        let inner = self.inner.read().await;
        let txs = inner
            .transactions
            .iter()
            .filter(|t| t.kind == kind)
            .cloned()
            .collect();
        Ok(newest_first(txs))
    }

    async fn all_transactions(&self) -> BookResult<Vec<Transaction>> {
        self.check_online()?;
        Ok(self.inner.read().await.transactions.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchOdds, MatchStatus};
    use rust_decimal_macros::dec;

    fn deposit(user: &str, amount: Decimal) -> TransactionDraft {
        TransactionDraft::completed(user, TransactionType::Deposit, amount, "Deposit to wallet")
    }

    #[tokio::test]
    async fn test_commit_creates_wallet_when_expected_none() {
        let store = MemoryStore::new();
        let tx = store
            .commit_balance_change("u1", None, dec!(25), deposit("u1", dec!(25)))
            .await
            .unwrap();
        assert!(tx.is_some());
        assert_eq!(store.wallet("u1").await.unwrap().unwrap().balance, dec!(25));
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_expectation() {
        let store = MemoryStore::new();
        store.ensure_wallet("u1", dec!(100)).await.unwrap();

        let result = store
            .commit_balance_change("u1", Some(dec!(90)), dec!(140), deposit("u1", dec!(50)))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(store.wallet("u1").await.unwrap().unwrap().balance, dec!(100));
        assert!(store.transactions_for("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_wallet_keeps_existing_balance() {
        let store = MemoryStore::new();
        store.ensure_wallet("u1", dec!(10)).await.unwrap();
        let w = store.ensure_wallet("u1", dec!(0)).await.unwrap();
        assert_eq!(w.balance, dec!(10));
    }

    #[tokio::test]
    async fn test_transactions_newest_first_and_filtered() {
        let store = MemoryStore::new();
        store.append_transaction(deposit("u1", dec!(1))).await.unwrap();
        store.append_transaction(deposit("u2", dec!(2))).await.unwrap();
        store.append_transaction(deposit("u1", dec!(3))).await.unwrap();

        let txs = store.transactions_for("u1").await.unwrap();
        assert_eq!(txs.len(), 2);
        assert!(txs[0].timestamp >= txs[1].timestamp);
    }

    #[tokio::test]
    async fn test_offline_fails_with_service_unavailable() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.wallet("u1").await.unwrap_err();
        assert!(matches!(err, BookError::ServiceUnavailable(_)));
        store.set_offline(false);
        assert!(store.wallet("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_lifecycle() {
        let store = MemoryStore::new();
        let m = store
            .add_match(NewMatch {
                match_id: Some(7),
                sport: "football".into(),
                label: None,
                team_a: "Arsenal".into(),
                team_b: "Chelsea".into(),
                time: "15:00".into(),
                league: "EPL".into(),
                odds: MatchOdds { team_a: dec!(1.5), draw: Some(dec!(3.5)), team_b: dec!(2.5) },
                status: MatchStatus::Upcoming,
            })
            .await
            .unwrap();
        assert_eq!(m.label, "Arsenal vs Chelsea");

        let updated = store
            .update_match(&m.id, MatchPatch { odds: None, status: Some(MatchStatus::Live) })
            .await
            .unwrap();
        assert_eq!(updated.status, MatchStatus::Live);
        assert_eq!(updated.odds.team_a, dec!(1.5));

        store.delete_match(&m.id).await.unwrap();
        assert!(store.matches().await.unwrap().is_empty());
        assert!(matches!(
            store.delete_match(&m.id).await,
            Err(BookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_user_status_unknown_user() {
        let store = MemoryStore::new();
        let err = store.set_user_status("ghost", UserStatus::Suspended).await.unwrap_err();
        assert!(matches!(err, BookError::NotFound(_)));
    }
}
