//! Application root.
//!
//! `Sportsbook` is built once at startup and owns every store. Session
//! changes are pushed to the ledger, the bet slip and the admin gate right
//! after the provider call that caused them.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::admin::AdminConsole;
use crate::betslip::{BetSlipStore, SlipCache};
use crate::feed::{self, FeedEvent, ResultsFeed};
use crate::ledger::Ledger;
use crate::session::{Session, SessionProvider};
use crate::store::DocumentStore;
use crate::types::{BookResult, Identity, Match, MatchStatus, Transaction, UserProfile, UserStatus};

/// Outcome of a successful bet placement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedBet {
    pub transaction: Transaction,
    pub potential_winnings: Decimal,
    pub balance: Decimal,
}

pub struct Sportsbook {
    pub session: Arc<Session>,
    pub ledger: Ledger,
    pub slip: BetSlipStore,
    pub admin: AdminConsole,
    store: Arc<dyn DocumentStore>,
    feed: Arc<dyn ResultsFeed>,
    /// Last match list served, so selections price against what was shown.
    board: RwLock<Vec<Match>>,
}

impl Sportsbook {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn SessionProvider>,
        cache: Arc<dyn SlipCache>,
        feed: Arc<dyn ResultsFeed>,
    ) -> Self {
        let session = Arc::new(Session::new(auth));
        Self {
            ledger: Ledger::new(store.clone(), session.clone()),
            slip: BetSlipStore::new(cache),
            admin: AdminConsole::new(store.clone()),
            session,
            store,
            feed,
            board: RwLock::new(Vec::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    /// Create an account, store its profile and sign it in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
        display_name: &str,
    ) -> BookResult<Identity> {
        let identity = self.session.sign_up(email, password, display_name).await?;
        let profile = UserProfile {
            id: identity.uid.clone(),
            email: Some(identity.email.clone()),
            display_name: identity.display_name.clone(),
            status: UserStatus::Active,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.put_user(profile).await {
            warn!(uid = %identity.uid, error = %e, "Error saving user profile");
        }
        self.sync_identity().await;
        Ok(identity)
    }

    pub async fn sign_in(&self, email: &str, password: &SecretString) -> BookResult<Identity> {
        let identity = self.session.sign_in(email, password).await?;
        self.sync_identity().await;
        Ok(identity)
    }

    pub async fn sign_out(&self) -> BookResult<()> {
        self.session.sign_out().await?;
        self.sync_identity().await;
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> BookResult<()> {
        self.session.send_password_reset(email).await
    }

    pub async fn update_display_name(&self, display_name: &str) -> BookResult<Identity> {
        self.session.update_display_name(display_name).await
    }

    /// Point every store at the current session identity.
    pub async fn sync_identity(&self) {
        let identity = self.session.current();
        let identity = identity.as_ref();
        self.slip.on_identity(identity).await;
        self.ledger.on_identity(identity).await;
        self.admin.on_identity(identity).await;
    }

    // -----------------------------------------------------------------------
    // Betting
    // -----------------------------------------------------------------------

    /// Place the current slip and drop the placed selections once the debit
    /// has landed.
    pub async fn place_bet(&self) -> BookResult<PlacedBet> {
        let slip = self.slip.snapshot().await;
        let transaction = self.ledger.place_bet(&slip).await?;
        self.slip.clear_placed(&slip).await;
        Ok(PlacedBet {
            potential_winnings: slip.potential_winnings(),
            balance: self.ledger.cached_balance().await,
            transaction,
        })
    }

    /// Find a match by its numeric id on the last served board, loading
    /// today's board if the id is not on it.
    pub async fn find_match(&self, match_id: i64) -> BookResult<Option<Match>> {
        if let Some(m) = self.board.read().await.iter().find(|m| m.match_id == match_id) {
            return Ok(Some(m.clone()));
        }
        Ok(self
            .matches(None)
            .await?
            .into_iter()
            .find(|m| m.match_id == match_id))
    }

    // -----------------------------------------------------------------------
    // Fixtures
    // -----------------------------------------------------------------------

    /// Open stored matches followed by feed fixtures for `date` (default
    /// today) and the day after.
    pub async fn matches(&self, date: Option<NaiveDate>) -> BookResult<Vec<Match>> {
        let day = date.unwrap_or_else(|| Utc::now().date_naive());
        let mut matches: Vec<Match> = self
            .store
            .matches()
            .await?
            .into_iter()
            .filter(|m| m.status != MatchStatus::Completed)
            .collect();
        let fixtures = feed::fetch_matches(self.feed.as_ref(), day).await;
        info!(stored = matches.len(), feed = fixtures.len(), %day, "Match list built");
        matches.extend(fixtures);
        *self.board.write().await = matches.clone();
        Ok(matches)
    }

    /// Recent results for one league, straight from the feed.
    pub async fn league_results(&self, league_id: &str) -> Vec<FeedEvent> {
        self.feed.past_league_events(league_id).await
    }
}
