//! Balance ledger.
//!
//! Client view of the remote wallet: a cached balance and transaction list
//! kept in step with the store. Every balance change is an optimistic
//! conditional write on the balance that was just read; a lost race is
//! re-read and re-validated, up to `MAX_COMMIT_ATTEMPTS` times.

use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::betslip::BetSlip;
use crate::session::Session;
use crate::store::LedgerStore;
use crate::types::{BookError, BookResult, Identity, Transaction, TransactionDraft, TransactionType};

/// Attempts at a conditional balance write before giving up with `Conflict`.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Default)]
struct LedgerCache {
    balance: Decimal,
    transactions: Vec<Transaction>,
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    session: Arc<Session>,
    cache: RwLock<LedgerCache>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, session: Arc<Session>) -> Self {
        Self {
            store,
            session,
            cache: RwLock::new(LedgerCache::default()),
        }
    }

    // -----------------------------------------------------------------------
    // Cached view
    // -----------------------------------------------------------------------

    pub async fn cached_balance(&self) -> Decimal {
        self.cache.read().await.balance
    }

    /// Cached transactions, newest first.
    pub async fn cached_transactions(&self) -> Vec<Transaction> {
        self.cache.read().await.transactions.clone()
    }

    /// Reload the cache for a new identity, or empty it on sign-out.
    /// Load failures are logged and leave the cache empty.
    pub async fn on_identity(&self, identity: Option<&Identity>) {
        *self.cache.write().await = LedgerCache::default();
        let Some(identity) = identity else {
            return;
        };
        if let Err(e) = self.balance().await {
            warn!(uid = %identity.uid, error = %e, "Error fetching balance");
        }
        if let Err(e) = self.transactions().await {
            warn!(uid = %identity.uid, error = %e, "Error fetching transactions");
        }
    }

    // -----------------------------------------------------------------------
    // Remote reads
    // -----------------------------------------------------------------------

    /// Read the remote balance, creating an empty wallet if there is none.
    pub async fn balance(&self) -> BookResult<Decimal> {
        let identity = self.session.require()?;
        let balance = match self.store.wallet(&identity.uid).await? {
            Some(wallet) => wallet.balance,
            None => {
                debug!(uid = %identity.uid, "No wallet yet, initializing");
                self.store.ensure_wallet(&identity.uid, Decimal::ZERO).await?.balance
            }
        };
        self.cache.write().await.balance = balance;
        Ok(balance)
    }

    /// Remote transaction list for the identity, newest first.
    pub async fn transactions(&self) -> BookResult<Vec<Transaction>> {
        let identity = self.session.require()?;
        let transactions = self.store.transactions_for(&identity.uid).await?;
        self.cache.write().await.transactions = transactions.clone();
        Ok(transactions)
    }

    // -----------------------------------------------------------------------
    // Balance mutations
    // -----------------------------------------------------------------------

    pub async fn deposit(&self, amount: Decimal) -> BookResult<Transaction> {
        let identity = self.session.require()?;
        if amount <= Decimal::ZERO {
            return Err(BookError::InvalidAmount);
        }

        let draft = TransactionDraft::completed(
            &identity.uid,
            TransactionType::Deposit,
            amount,
            "Deposit to wallet",
        );
        let (balance, tx) = self
            .commit(&identity.uid, draft, |current| {
                Ok(current.unwrap_or(Decimal::ZERO) + amount)
            })
            .await?;

        info!(uid = %identity.uid, amount = %amount, balance = %balance, "Deposit completed");
        Ok(tx)
    }

    pub async fn withdraw(&self, amount: Decimal) -> BookResult<Transaction> {
        let identity = self.session.require()?;
        if amount <= Decimal::ZERO {
            return Err(BookError::InvalidAmount);
        }

        let draft = TransactionDraft::completed(
            &identity.uid,
            TransactionType::Withdraw,
            amount,
            "Withdrawal from wallet",
        );
        let (balance, tx) = self
            .commit(&identity.uid, draft, |current| debit(current, amount))
            .await?;

        info!(uid = %identity.uid, amount = %amount, balance = %balance, "Withdrawal completed");
        Ok(tx)
    }

    /// Debit the slip's total stake and record one `bet` transaction carrying
    /// the slip snapshot. The slip itself is left to the caller to clear.
    pub async fn place_bet(&self, slip: &BetSlip) -> BookResult<Transaction> {
        let identity = self.session.require()?;
        let stake = slip.total_stake();
        if slip.is_empty() || stake <= Decimal::ZERO {
            return Err(BookError::InvalidAmount);
        }

        let mut draft =
            TransactionDraft::completed(&identity.uid, TransactionType::Bet, stake, &slip.describe());
        draft.bet_details = Some(slip.bet_details());

        let (balance, tx) = self
            .commit(&identity.uid, draft, |current| debit(current, stake))
            .await?;

        info!(
            uid = %identity.uid,
            mode = %slip.mode(),
            selections = slip.len(),
            stake = %stake,
            potential = %slip.potential_winnings(),
            balance = %balance,
            "Bet placed"
        );
        Ok(tx)
    }

    /// Read, validate and conditionally write a new balance together with its
    /// transaction record. The cache is touched only after the write lands.
    async fn commit<F>(
        &self,
        uid: &str,
        draft: TransactionDraft,
        next_balance: F,
    ) -> BookResult<(Decimal, Transaction)>
    where
        F: Fn(Option<Decimal>) -> BookResult<Decimal>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let current = self.store.wallet(uid).await?.map(|w| w.balance);
            let new_balance = next_balance(current)?;

            let committed = self
                .store
                .commit_balance_change(uid, current, new_balance, draft.clone())
                .await?;

            if let Some(tx) = committed {
                let mut cache = self.cache.write().await;
                cache.balance = new_balance;
                cache.transactions.insert(0, tx.clone());
                return Ok((new_balance, tx));
            }

            warn!(uid, attempt, "Balance changed during update, retrying");
        }

        Err(BookError::Conflict)
    }
}

/// Balance after taking `amount` out, or `InsufficientFunds`.
fn debit(current: Option<Decimal>, amount: Decimal) -> BookResult<Decimal> {
    let available = current.unwrap_or(Decimal::ZERO);
    if amount > available {
        return Err(BookError::InsufficientFunds {
            needed: amount,
            available,
        });
    }
    Ok(available - amount)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
