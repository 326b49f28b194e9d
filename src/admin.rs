//! Admin gating.
//!
//! `AdminConsole` resolves whether the session identity holds an admin role
//! record and exposes the privileged match/user/bet operations only while it
//! does. Status moves `Unknown -> Checking -> Admin | NotAdmin` and falls
//! back to `Unknown` on every identity change.

use chrono::{DateTime, Months, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::store::DocumentStore;
use crate::types::{
    AdminRecord, BetMode, BookError, BookResult, Identity, Match, MatchPatch, NewMatch,
    Transaction, TransactionType, UserProfile, UserStatus,
};

/// Number of matches listed in `BetStats::popular_matches`.
pub const POPULAR_MATCH_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AdminStatus {
    Unknown,
    Checking,
    Admin { record: AdminRecord },
    NotAdmin,
}

impl AdminStatus {
    pub fn is_admin(&self) -> bool {
        matches!(self, AdminStatus::Admin { .. })
    }
}

struct GateState {
    uid: Option<String>,
    status: AdminStatus,
}

pub struct AdminConsole {
    store: Arc<dyn DocumentStore>,
    state: RwLock<GateState>,
}

impl AdminConsole {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            state: RwLock::new(GateState {
                uid: None,
                status: AdminStatus::Unknown,
            }),
        }
    }

    pub async fn status(&self) -> AdminStatus {
        self.state.read().await.status.clone()
    }

    /// Re-run the role lookup for a new identity.
    ///
    /// A missing record or a failed lookup both settle on `NotAdmin`. If the
    /// identity changes again while the lookup is in flight, its result is
    /// discarded.
    pub async fn on_identity(&self, identity: Option<&Identity>) {
        let uid = identity.map(|i| i.uid.clone());
        {
            let mut state = self.state.write().await;
            state.uid = uid.clone();
            state.status = AdminStatus::Unknown;
            if uid.is_some() {
                state.status = AdminStatus::Checking;
            }
        }
        let Some(uid) = uid else {
            return;
        };

        let status = match self.store.admin_record(&uid).await {
            Ok(Some(record)) => {
                info!(uid = %uid, role = %record.role, "Admin access granted");
                AdminStatus::Admin { record }
            }
            Ok(None) => {
                debug!(uid = %uid, "No admin record");
                AdminStatus::NotAdmin
            }
            Err(e) => {
                warn!(uid = %uid, error = %e, "Error checking admin status");
                AdminStatus::NotAdmin
            }
        };

        let mut state = self.state.write().await;
        if state.uid.as_deref() == Some(uid.as_str()) {
            state.status = status;
        }
    }

    async fn require_admin(&self) -> BookResult<()> {
        if self.state.read().await.status.is_admin() {
            Ok(())
        } else {
            Err(BookError::Unauthorized)
        }
    }

    // -----------------------------------------------------------------------
    // Gated operations
    // -----------------------------------------------------------------------

    pub async fn users(&self) -> BookResult<Vec<UserProfile>> {
        self.require_admin().await?;
        self.store.users().await
    }

    pub async fn matches(&self) -> BookResult<Vec<Match>> {
        self.require_admin().await?;
        self.store.matches().await
    }

    /// All bet transactions across users, newest first.
    pub async fn bets(&self) -> BookResult<Vec<Transaction>> {
        self.require_admin().await?;
        self.store.transactions_of_kind(TransactionType::Bet).await
    }

    /// Betting statistics over bets placed within `range`.
    pub async fn bet_stats(&self, range: StatsRange) -> BookResult<BetStats> {
        self.require_admin().await?;
        let bets = self.store.transactions_of_kind(TransactionType::Bet).await?;
        let stats = bet_stats(&bets, range, Utc::now());
        debug!(range = ?range, bets = stats.total_bets, wagered = %stats.total_wagered, "Bet stats computed");
        Ok(stats)
    }

    pub async fn add_match(&self, new_match: NewMatch) -> BookResult<Match> {
        self.require_admin().await?;
        let created = self.store.add_match(new_match).await?;
        info!(id = %created.id, label = %created.label, "Match added");
        Ok(created)
    }

    pub async fn update_match(&self, id: &str, patch: MatchPatch) -> BookResult<Match> {
        self.require_admin().await?;
        let updated = self.store.update_match(id, patch).await?;
        info!(id, status = %updated.status, "Match updated");
        Ok(updated)
    }

    pub async fn delete_match(&self, id: &str) -> BookResult<()> {
        self.require_admin().await?;
        self.store.delete_match(id).await?;
        info!(id, "Match deleted");
        Ok(())
    }

    pub async fn set_user_status(&self, user_id: &str, status: UserStatus) -> BookResult<UserProfile> {
        self.require_admin().await?;
        let profile = self.store.set_user_status(user_id, status).await?;
        info!(user_id, status = %status, "User status changed");
        Ok(profile)
    }
}

// ---------------------------------------------------------------------------
// Bet statistics
// ---------------------------------------------------------------------------

/// Reporting window, always ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsRange {
    /// Since midnight UTC.
    Today,
    #[default]
    Week,
    Month,
    All,
}

impl StatsRange {
    /// Earliest timestamp inside the window; `None` means unbounded.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            StatsRange::Today => now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|midnight| Utc.from_utc_datetime(&midnight)),
            StatsRange::Week => Some(now - chrono::Duration::days(7)),
            StatsRange::Month => now.checked_sub_months(Months::new(1)),
            StatsRange::All => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularMatch {
    #[serde(rename = "match")]
    pub label: String,
    /// Legs placed on this match.
    pub bets: usize,
    /// Stake attributed to this match.
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetStats {
    pub range: StatsRange,
    pub total_wagered: Decimal,
    pub total_bets: usize,
    pub average_bet: Decimal,
    pub single_bets: usize,
    pub multi_bets: usize,
    pub popular_matches: Vec<PopularMatch>,
}

/// Summarize the bets placed in `range` up to `now`.
///
/// Single legs are credited their own stake. A multi bet splits its amount
/// evenly across its legs. Popular matches are ordered by leg count, ties
/// in first-seen order.
pub fn bet_stats(bets: &[Transaction], range: StatsRange, now: DateTime<Utc>) -> BetStats {
    let start = range.start(now);
    let in_range: Vec<&Transaction> = bets
        .iter()
        .filter(|t| t.kind == TransactionType::Bet)
        .filter(|t| t.timestamp <= now && start.map_or(true, |s| t.timestamp >= s))
        .collect();

    let total_wagered: Decimal = in_range.iter().map(|t| t.amount).sum();
    let total_bets = in_range.len();
    let average_bet = if total_bets > 0 {
        total_wagered / Decimal::from(total_bets)
    } else {
        Decimal::ZERO
    };

    let mut single_bets = 0;
    let mut multi_bets = 0;
    let mut popular: Vec<PopularMatch> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for bet in &in_range {
        let Some(details) = &bet.bet_details else {
            continue;
        };
        match details.mode {
            BetMode::Single => single_bets += 1,
            BetMode::Multi => multi_bets += 1,
        }
        let legs = details.selections.len();
        for leg in &details.selections {
            let share = match details.mode {
                BetMode::Single => leg.stake.unwrap_or(Decimal::ZERO),
                BetMode::Multi => bet.amount / Decimal::from(legs),
            };
            let slot = *index.entry(leg.label.clone()).or_insert_with(|| {
                popular.push(PopularMatch {
                    label: leg.label.clone(),
                    bets: 0,
                    amount: Decimal::ZERO,
                });
                popular.len() - 1
            });
            popular[slot].bets += 1;
            popular[slot].amount += share;
        }
    }

    popular.sort_by(|a, b| b.bets.cmp(&a.bets));
    popular.truncate(POPULAR_MATCH_LIMIT);

    BetStats {
        range,
        total_wagered,
        total_bets,
        average_bet,
        single_bets,
        multi_bets,
        popular_matches: popular,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{AdminRole, BetDetails, BetLeg, MatchOdds, MatchStatus, TransactionDraft};
    use rust_decimal_macros::dec;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.to_string(),
            email: format!("{uid}@example.com"),
            display_name: None,
        }
    }

    async fn store_with_admin() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .put_admin(AdminRecord {
                uid: "boss".into(),
                email: "boss@example.com".into(),
                role: AdminRole::Superadmin,
            })
            .await
            .unwrap();
        store
    }

    fn new_match() -> NewMatch {
        NewMatch {
            match_id: Some(7),
            sport: "football".into(),
            label: None,
            team_a: "Arsenal".into(),
            team_b: "Chelsea".into(),
            time: "19:45".into(),
            league: "Premier League".into(),
            odds: MatchOdds {
                team_a: dec!(2.1),
                draw: Some(dec!(3.3)),
                team_b: dec!(3.4),
            },
            status: MatchStatus::Upcoming,
        }
    }

    #[tokio::test]
    async fn test_starts_unknown() {
        let console = AdminConsole::new(Arc::new(MemoryStore::new()));
        assert_eq!(console.status().await, AdminStatus::Unknown);
        assert_eq!(console.users().await.unwrap_err(), BookError::Unauthorized);
    }

    #[tokio::test]
    async fn test_admin_record_grants_access() {
        let console = AdminConsole::new(store_with_admin().await);
        console.on_identity(Some(&identity("boss"))).await;
        assert!(console.status().await.is_admin());

        let created = console.add_match(new_match()).await.unwrap();
        assert_eq!(created.label, "Arsenal vs Chelsea");

        let patched = console
            .update_match(
                &created.id,
                MatchPatch {
                    odds: None,
                    status: Some(MatchStatus::Live),
                },
            )
            .await
            .unwrap();
        assert_eq!(patched.status, MatchStatus::Live);
        assert_eq!(console.matches().await.unwrap().len(), 1);

        console.delete_match(&created.id).await.unwrap();
        assert!(console.matches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_is_unauthorized() {
        let console = AdminConsole::new(store_with_admin().await);
        console.on_identity(Some(&identity("punter"))).await;
        assert_eq!(console.status().await, AdminStatus::NotAdmin);
        assert_eq!(console.add_match(new_match()).await.unwrap_err(), BookError::Unauthorized);
        assert_eq!(console.bets().await.unwrap_err(), BookError::Unauthorized);
        assert_eq!(
            console.set_user_status("x", UserStatus::Suspended).await.unwrap_err(),
            BookError::Unauthorized
        );
    }

    #[tokio::test]
    async fn test_lookup_failure_is_not_admin() {
        let store = store_with_admin().await;
        store.set_offline(true);
        let console = AdminConsole::new(store);
        console.on_identity(Some(&identity("boss"))).await;
        assert_eq!(console.status().await, AdminStatus::NotAdmin);
    }

    #[tokio::test]
    async fn test_identity_change_resets() {
        let console = AdminConsole::new(store_with_admin().await);
        console.on_identity(Some(&identity("boss"))).await;
        assert!(console.status().await.is_admin());
        console.on_identity(None).await;
        assert_eq!(console.status().await, AdminStatus::Unknown);
        assert_eq!(console.matches().await.unwrap_err(), BookError::Unauthorized);
    }

    #[tokio::test]
    async fn test_set_user_status() {
        let store = store_with_admin().await;
        store
            .put_user(UserProfile {
                id: "u1".into(),
                email: Some("u1@example.com".into()),
                display_name: None,
                status: UserStatus::Active,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let console = AdminConsole::new(store);
        console.on_identity(Some(&identity("boss"))).await;

        let profile = console.set_user_status("u1", UserStatus::Suspended).await.unwrap();
        assert_eq!(profile.status, UserStatus::Suspended);
        assert!(matches!(
            console.set_user_status("ghost", UserStatus::Active).await,
            Err(BookError::NotFound(_))
        ));
    }

    fn leg(label: &str, stake: Option<Decimal>) -> BetLeg {
        BetLeg {
            label: label.to_string(),
            selection: "Home".into(),
            odds: dec!(2),
            stake,
        }
    }

    fn bet_at(amount: Decimal, mode: BetMode, legs: Vec<BetLeg>, at: DateTime<Utc>) -> Transaction {
        let mut draft = TransactionDraft::completed("u1", TransactionType::Bet, amount, "bet");
        draft.bet_details = Some(BetDetails {
            mode,
            selections: legs,
            total_odds: None,
        });
        draft.into_transaction(uuid::Uuid::new_v4().to_string(), at)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stats_range_boundaries() {
        let now = noon();
        let one = |at| bet_at(dec!(1), BetMode::Single, vec![leg("A vs B", Some(dec!(1)))], at);
        let bets = vec![
            one(now - chrono::Duration::hours(1)),
            one(Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap()),
            one(Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap()),
            one(now - chrono::Duration::days(7)),
            one(now - chrono::Duration::days(7) - chrono::Duration::seconds(1)),
            one(Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap()),
            one(Utc.with_ymd_and_hms(2026, 2, 15, 11, 59, 59).unwrap()),
            one(now + chrono::Duration::seconds(1)),
        ];

        assert_eq!(bet_stats(&bets, StatsRange::Today, now).total_bets, 2);
        assert_eq!(bet_stats(&bets, StatsRange::Week, now).total_bets, 4);
        assert_eq!(bet_stats(&bets, StatsRange::Month, now).total_bets, 6);
        assert_eq!(bet_stats(&bets, StatsRange::All, now).total_bets, 7);
    }

    #[test]
    fn test_stats_totals_and_multi_split() {
        let now = noon();
        let at = now - chrono::Duration::minutes(5);
        let bets = vec![
            bet_at(
                dec!(10),
                BetMode::Single,
                vec![leg("A vs B", Some(dec!(4))), leg("C vs D", Some(dec!(6)))],
                at,
            ),
            bet_at(
                dec!(9),
                BetMode::Multi,
                vec![leg("E vs F", None), leg("A vs B", None), leg("G vs H", None)],
                at,
            ),
        ];

        let stats = bet_stats(&bets, StatsRange::Today, now);
        assert_eq!(stats.total_wagered, dec!(19));
        assert_eq!(stats.total_bets, 2);
        assert_eq!(stats.average_bet, dec!(9.5));
        assert_eq!(stats.single_bets, 1);
        assert_eq!(stats.multi_bets, 1);

        let top = &stats.popular_matches;
        assert_eq!(top[0].label, "A vs B");
        assert_eq!(top[0].bets, 2);
        assert_eq!(top[0].amount, dec!(7));
        let labels: Vec<_> = top.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["A vs B", "C vs D", "E vs F", "G vs H"]);
        assert_eq!(top[2].amount, dec!(3));
    }

    #[test]
    fn test_stats_top_five_and_empty() {
        let now = noon();
        let legs = ["M1", "M2", "M3", "M4", "M5", "M6"]
            .iter()
            .map(|l| leg(l, Some(dec!(1))))
            .collect();
        let bets = vec![bet_at(dec!(6), BetMode::Single, legs, now)];
        let stats = bet_stats(&bets, StatsRange::All, now);
        assert_eq!(stats.popular_matches.len(), POPULAR_MATCH_LIMIT);
        assert_eq!(stats.popular_matches[0].label, "M1");

        let empty = bet_stats(&[], StatsRange::Week, now);
        assert_eq!(empty.total_bets, 0);
        assert_eq!(empty.average_bet, Decimal::ZERO);
        assert!(empty.popular_matches.is_empty());
    }

    #[tokio::test]
    async fn test_bet_stats_gated() {
        let store = store_with_admin().await;
        store
            .append_transaction(TransactionDraft {
                bet_details: Some(BetDetails {
                    mode: BetMode::Multi,
                    selections: vec![leg("A vs B", None), leg("C vs D", None)],
                    total_odds: Some(dec!(4)),
                }),
                ..TransactionDraft::completed("u1", TransactionType::Bet, dec!(8), "Multi bet with 2 selections")
            })
            .await
            .unwrap();
        let console = AdminConsole::new(store);

        console.on_identity(Some(&identity("punter"))).await;
        assert_eq!(console.bet_stats(StatsRange::All).await.unwrap_err(), BookError::Unauthorized);

        console.on_identity(Some(&identity("boss"))).await;
        let stats = console.bet_stats(StatsRange::Today).await.unwrap();
        assert_eq!(stats.total_wagered, dec!(8));
        assert_eq!(stats.popular_matches[1].amount, dec!(4));
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_value(AdminStatus::NotAdmin).unwrap();
        assert_eq!(json["state"], "not_admin");
    }
}
