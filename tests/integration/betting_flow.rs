//! End-to-end betting flows through `Sportsbook`.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;

use sportsbook::admin::StatsRange;
use sportsbook::app::Sportsbook;
use sportsbook::betslip::{MemorySlipCache, Toggle, DEFAULT_SINGLE_STAKE};
use sportsbook::store::{DocumentStore, MemoryStore};
use sportsbook::types::{
    AdminRecord, AdminRole, BetMode, BookError, MatchOdds, MatchStatus, NewMatch, OutcomeType,
    TransactionType,
};

use crate::mock_feed::MockFeed;

struct Harness {
    app: Sportsbook,
    store: Arc<MemoryStore>,
    feed: MockFeed,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let feed = MockFeed::new();
    let app = Sportsbook::new(
        store.clone(),
        Arc::new(sportsbook::session::MemoryAuth::new()),
        Arc::new(MemorySlipCache::new()),
        Arc::new(feed.clone()),
    );
    Harness { app, store, feed }
}

fn pw() -> SecretString {
    SecretString::new("correct horse".to_string())
}

async fn stored_match(store: &MemoryStore, match_id: i64, team_a: Decimal, team_b: Decimal) {
    store
        .add_match(NewMatch {
            match_id: Some(match_id),
            sport: "football".into(),
            label: None,
            team_a: format!("Home {match_id}"),
            team_b: format!("Away {match_id}"),
            time: "18:00".into(),
            league: "Premier League".into(),
            odds: MatchOdds {
                team_a,
                draw: Some(dec!(3.4)),
                team_b,
            },
            status: MatchStatus::Upcoming,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_feed_fixtures_for_today_and_tomorrow() {
    let h = harness();
    let today = Utc::now().date_naive();
    let tomorrow = today + Duration::days(1);
    h.feed.add_events(today, "Soccer", vec![MockFeed::event(101, "Soccer", "Arsenal", "Spurs", Some("15:00"))]);
    h.feed.add_events(tomorrow, "Cricket", vec![MockFeed::event(202, "Cricket", "India", "Pakistan", None)]);

    let matches = h.app.matches(Some(today)).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].sport, "football");
    assert_eq!(matches[0].label, "Arsenal vs Spurs");
    assert!(matches[0].odds.draw.is_some());
    assert_eq!(matches[1].sport, "cricket");
    assert_eq!(matches[1].time, "00:00");
    assert_eq!(matches[1].date, Some(tomorrow));

    let mut requests = h.feed.requests();
    requests.sort();
    assert_eq!(
        requests,
        vec![
            format!("day:{today}:Cricket"),
            format!("day:{today}:Soccer"),
            format!("day:{tomorrow}:Cricket"),
            format!("day:{tomorrow}:Soccer"),
        ]
    );
}

#[tokio::test]
async fn test_completed_stored_matches_hidden() {
    let h = harness();
    stored_match(&h.store, 1, dec!(2), dec!(3)).await;
    stored_match(&h.store, 2, dec!(2), dec!(3)).await;
    let id = h.store.matches().await.unwrap()[1].id.clone();
    h.store
        .update_match(
            &id,
            sportsbook::types::MatchPatch {
                odds: None,
                status: Some(MatchStatus::Completed),
            },
        )
        .await
        .unwrap();

    let matches = h.app.matches(None).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].match_id, 1);
}

#[tokio::test]
async fn test_single_bets_debit_total_stake() {
    let h = harness();
    let today = Utc::now().date_naive();
    h.feed.add_events(
        today,
        "Soccer",
        vec![
            MockFeed::event(1, "Soccer", "Inter", "Milan", Some("20:45")),
            MockFeed::event(2, "Soccer", "Roma", "Lazio", Some("18:00")),
        ],
    );

    h.app.sign_up("fan@example.com", &pw(), "Fan").await.unwrap();
    h.app.ledger.deposit(dec!(100)).await.unwrap();

    let board = h.app.matches(Some(today)).await.unwrap();
    h.app.slip.add_or_toggle_selection(&board[0], OutcomeType::TeamA).await.unwrap();
    h.app.slip.add_or_toggle_selection(&board[1], OutcomeType::Draw).await.unwrap();
    h.app.slip.update_stake("2_draw", dec!(7.5)).await;

    let slip = h.app.slip.snapshot().await;
    assert_eq!(slip.stake_for("1_teamA"), DEFAULT_SINGLE_STAKE);
    assert_eq!(slip.total_stake(), DEFAULT_SINGLE_STAKE + dec!(7.5));
    let expected_winnings =
        DEFAULT_SINGLE_STAKE * board[0].odds.team_a + dec!(7.5) * board[1].odds.draw.unwrap();
    assert_eq!(slip.potential_winnings(), expected_winnings);

    let placed = h.app.place_bet().await.unwrap();
    assert_eq!(placed.potential_winnings, expected_winnings);
    assert_eq!(placed.balance, dec!(100) - DEFAULT_SINGLE_STAKE - dec!(7.5));
    assert_eq!(placed.transaction.kind, TransactionType::Bet);
    assert_eq!(placed.transaction.description, "Bet on 2 selections");

    let details = placed.transaction.bet_details.unwrap();
    assert_eq!(details.mode, BetMode::Single);
    assert!(details.total_odds.is_none());
    assert_eq!(details.selections.len(), 2);
    assert_eq!(details.selections[1].stake, Some(dec!(7.5)));

    assert!(h.app.slip.snapshot().await.is_empty());
    assert_eq!(h.app.ledger.balance().await.unwrap(), placed.balance);
}

#[tokio::test]
async fn test_multi_bet_pays_product_of_odds() {
    let h = harness();
    stored_match(&h.store, 10, dec!(2.0), dec!(4.0)).await;
    stored_match(&h.store, 11, dec!(1.5), dec!(2.6)).await;
    h.app.sign_up("acca@example.com", &pw(), "Acca").await.unwrap();
    h.app.ledger.deposit(dec!(25)).await.unwrap();

    for id in [10, 11] {
        let m = h.app.find_match(id).await.unwrap().unwrap();
        assert!(matches!(
            h.app.slip.add_or_toggle_selection(&m, OutcomeType::TeamA).await.unwrap(),
            Toggle::Added(_)
        ));
    }
    h.app.slip.set_mode(BetMode::Multi).await;
    h.app.slip.update_multi_stake(dec!(10)).await;

    let slip = h.app.slip.snapshot().await;
    assert_eq!(slip.accumulator_odds(), dec!(3.0));
    assert_eq!(slip.potential_winnings(), dec!(30.0));

    let placed = h.app.place_bet().await.unwrap();
    assert_eq!(placed.potential_winnings, dec!(30.0));
    assert_eq!(placed.balance, dec!(15));
    assert_eq!(placed.transaction.bet_details.unwrap().total_odds, Some(dec!(3.0)));
    assert!(h.app.slip.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_failed_bet_keeps_slip_and_balance() {
    let h = harness();
    stored_match(&h.store, 5, dec!(2.2), dec!(3.1)).await;
    h.app.sign_up("broke@example.com", &pw(), "Broke").await.unwrap();
    h.app.ledger.deposit(dec!(3)).await.unwrap();

    let m = h.app.find_match(5).await.unwrap().unwrap();
    h.app.slip.add_or_toggle_selection(&m, OutcomeType::TeamB).await.unwrap();

    let err = h.app.place_bet().await.unwrap_err();
    assert_eq!(
        err,
        BookError::InsufficientFunds {
            needed: DEFAULT_SINGLE_STAKE,
            available: dec!(3)
        }
    );
    assert_eq!(h.app.slip.snapshot().await.len(), 1);
    assert_eq!(h.app.ledger.cached_balance().await, dec!(3));
    assert_eq!(h.app.ledger.transactions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bet_requires_session() {
    let h = harness();
    stored_match(&h.store, 5, dec!(2.2), dec!(3.1)).await;
    let m = h.app.find_match(5).await.unwrap().unwrap();
    h.app.slip.add_or_toggle_selection(&m, OutcomeType::TeamA).await.unwrap();
    assert_eq!(h.app.place_bet().await.unwrap_err(), BookError::NotAuthenticated);
}

#[tokio::test]
async fn test_offline_store_surfaces_service_unavailable() {
    let h = harness();
    h.app.sign_up("x@example.com", &pw(), "X").await.unwrap();
    h.app.ledger.deposit(dec!(20)).await.unwrap();

    h.store.set_offline(true);
    assert!(matches!(
        h.app.ledger.withdraw(dec!(5)).await,
        Err(BookError::ServiceUnavailable(_))
    ));
    assert!(matches!(h.app.matches(None).await, Err(BookError::ServiceUnavailable(_))));
    assert_eq!(h.app.ledger.cached_balance().await, dec!(20));

    h.store.set_offline(false);
    h.app.ledger.withdraw(dec!(5)).await.unwrap();
    assert_eq!(h.app.ledger.cached_balance().await, dec!(15));
}

#[tokio::test]
async fn test_admin_console_follows_session() {
    let h = harness();
    let admin = h.app.sign_up("admin@example.com", &pw(), "Admin").await.unwrap();
    h.app.sign_out().await.unwrap();
    h.store
        .put_admin(AdminRecord {
            uid: admin.uid.clone(),
            email: admin.email.clone(),
            role: AdminRole::Superadmin,
        })
        .await
        .unwrap();

    h.app.sign_up("punter@example.com", &pw(), "Punter").await.unwrap();
    h.app.ledger.deposit(dec!(40)).await.unwrap();
    stored_match(&h.store, 3, dec!(1.8), dec!(2.1)).await;
    let m = h.app.find_match(3).await.unwrap().unwrap();
    h.app.slip.add_or_toggle_selection(&m, OutcomeType::Draw).await.unwrap();
    h.app.place_bet().await.unwrap();
    assert_eq!(h.app.admin.bets().await.unwrap_err(), BookError::Unauthorized);
    h.app.sign_out().await.unwrap();

    h.app.sign_in("admin@example.com", &pw()).await.unwrap();
    assert!(h.app.admin.status().await.is_admin());
    let bets = h.app.admin.bets().await.unwrap();
    assert_eq!(bets.len(), 1);
    assert_eq!(bets[0].amount, DEFAULT_SINGLE_STAKE);
    let stats = h.app.admin.bet_stats(StatsRange::Today).await.unwrap();
    assert_eq!(stats.total_bets, 1);
    assert_eq!(stats.single_bets, 1);
    assert_eq!(stats.popular_matches[0].label, "Home 3 vs Away 3");
    assert_eq!(stats.popular_matches[0].amount, DEFAULT_SINGLE_STAKE);
    assert_eq!(h.app.admin.users().await.unwrap().len(), 2);

    h.app.sign_out().await.unwrap();
    assert!(!h.app.admin.status().await.is_admin());
}

#[tokio::test]
async fn test_league_results_pass_through() {
    let h = harness();
    h.feed.set_league_results(vec![MockFeed::event(9, "Soccer", "Ajax", "PSV", Some("14:30"))]);
    let results = h.app.league_results("4337").await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].home_team.as_deref(), Some("Ajax"));
    assert_eq!(h.feed.requests(), vec!["league:4337".to_string()]);

    h.feed.set_offline(true);
    assert!(h.app.league_results("4337").await.is_empty());
}

#[tokio::test]
async fn test_switching_accounts_keeps_slips_apart() {
    let h = harness();
    stored_match(&h.store, 8, dec!(1.9), dec!(2.4)).await;
    h.app.sign_up("first@example.com", &pw(), "First").await.unwrap();
    let m = h.app.find_match(8).await.unwrap().unwrap();
    h.app.slip.add_or_toggle_selection(&m, OutcomeType::TeamA).await.unwrap();

    // Second account signs in without the first signing out.
    h.app.sign_up("second@example.com", &pw(), "Second").await.unwrap();
    assert!(h.app.slip.snapshot().await.is_empty());
    h.app.sign_in("second@example.com", &pw()).await.unwrap();
    assert!(h.app.slip.snapshot().await.is_empty());

    h.app.sign_in("first@example.com", &pw()).await.unwrap();
    let slip = h.app.slip.snapshot().await;
    assert_eq!(slip.len(), 1);
    assert!(slip.contains("8_teamA"));
}
