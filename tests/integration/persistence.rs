//! State that must survive a restart: cached slips, the sqlite ledger and
//! the migration into the relational schema.

use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;

use sportsbook::app::Sportsbook;
use sportsbook::betslip::FileSlipCache;
use sportsbook::migration::{Migrator, SqliteTarget};
use sportsbook::session::MemoryAuth;
use sportsbook::store::{DocumentStore, LedgerStore, SqliteStore};
use sportsbook::types::{
    AdminRecord, AdminRole, BetMode, MatchOdds, MatchStatus, NewMatch, OutcomeType,
    TransactionType,
};

use crate::mock_feed::MockFeed;

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sportsbook-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn pw() -> SecretString {
    SecretString::new("hunter22".to_string())
}

/// A fresh process: new store connection and slip cache over the same files.
async fn boot(dir: &PathBuf, auth: Arc<MemoryAuth>) -> (Sportsbook, Arc<SqliteStore>) {
    let url = format!("sqlite://{}", dir.join("book.db").display());
    let store = Arc::new(SqliteStore::connect(&url).await.unwrap());
    let cache = Arc::new(FileSlipCache::new(dir.join("slips")).unwrap());
    let app = Sportsbook::new(store.clone(), auth, cache, Arc::new(MockFeed::new()));
    (app, store)
}

fn derby() -> NewMatch {
    NewMatch {
        match_id: Some(77),
        sport: "football".into(),
        label: None,
        team_a: "Everton".into(),
        team_b: "Liverpool".into(),
        time: "12:30".into(),
        league: "Premier League".into(),
        odds: MatchOdds {
            team_a: dec!(4.2),
            draw: Some(dec!(3.6)),
            team_b: dec!(1.8),
        },
        status: MatchStatus::Upcoming,
    }
}

#[tokio::test]
async fn test_slip_and_balance_survive_restart() {
    let dir = temp_dir();
    let auth = Arc::new(MemoryAuth::new());

    {
        let (app, store) = boot(&dir, auth.clone()).await;
        store.add_match(derby()).await.unwrap();
        app.sign_up("keeper@example.com", &pw(), "Keeper").await.unwrap();
        app.ledger.deposit(dec!(60)).await.unwrap();

        let m = app.find_match(77).await.unwrap().unwrap();
        app.slip.add_or_toggle_selection(&m, OutcomeType::TeamB).await.unwrap();
        app.slip.add_or_toggle_selection(&m, OutcomeType::Draw).await.unwrap();
        app.slip.set_mode(BetMode::Multi).await;
        app.slip.update_multi_stake_input("12.5").await;
    }

    let (app, _store) = boot(&dir, auth).await;
    assert!(app.slip.snapshot().await.is_empty());

    app.sign_in("keeper@example.com", &pw()).await.unwrap();
    let slip = app.slip.snapshot().await;
    assert_eq!(slip.len(), 2);
    assert!(slip.contains("77_teamB"));
    assert_eq!(slip.mode(), BetMode::Multi);
    assert_eq!(slip.multi_stake(), dec!(12.5));
    assert_eq!(app.ledger.cached_balance().await, dec!(60));

    let placed = app.place_bet().await.unwrap();
    assert_eq!(placed.balance, dec!(47.5));
    assert_eq!(placed.potential_winnings, dec!(12.5) * dec!(1.8) * dec!(3.6));

    // An empty slip leaves nothing behind in the cache dir.
    let leftovers = std::fs::read_dir(dir.join("slips")).unwrap().count();
    assert_eq!(leftovers, 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_sqlite_ledger_history_is_durable() {
    let dir = temp_dir();
    let auth = Arc::new(MemoryAuth::new());

    {
        let (app, _) = boot(&dir, auth.clone()).await;
        app.sign_up("saver@example.com", &pw(), "Saver").await.unwrap();
        app.ledger.deposit(dec!(100)).await.unwrap();
        app.ledger.withdraw(dec!(30.25)).await.unwrap();
    }

    let (app, store) = boot(&dir, auth).await;
    let identity = app.sign_in("saver@example.com", &pw()).await.unwrap();

    assert_eq!(app.ledger.balance().await.unwrap(), dec!(69.75));
    let txs = app.ledger.transactions().await.unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].kind, TransactionType::Withdraw);
    assert_eq!(txs[0].amount, dec!(30.25));
    assert_eq!(txs[1].kind, TransactionType::Deposit);
    assert!(txs.iter().all(|t| t.user_id == identity.uid));

    let wallet = store.wallet(&identity.uid).await.unwrap().unwrap();
    assert_eq!(wallet.balance, dec!(69.75));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_migration_copies_live_data() {
    let dir = temp_dir();
    let auth = Arc::new(MemoryAuth::new());
    let (app, store) = boot(&dir, auth).await;

    store.add_match(derby()).await.unwrap();
    let admin = app.sign_up("boss@example.com", &pw(), "Boss").await.unwrap();
    store
        .put_admin(AdminRecord {
            uid: admin.uid.clone(),
            email: admin.email.clone(),
            role: AdminRole::Admin,
        })
        .await
        .unwrap();
    app.ledger.deposit(dec!(20)).await.unwrap();
    let m = app.find_match(77).await.unwrap().unwrap();
    app.slip.add_or_toggle_selection(&m, OutcomeType::TeamA).await.unwrap();
    app.place_bet().await.unwrap();

    let target = Arc::new(SqliteTarget::connect("sqlite::memory:").await.unwrap());
    let migrator = Migrator::new(store.clone(), target.clone(), dir.join("backup"), 1);
    let report = migrator.run().await.unwrap();

    assert_eq!(report.users.migrated, 1);
    assert_eq!(report.admins.migrated, 1);
    assert_eq!(report.wallets.migrated, 1);
    assert_eq!(report.matches.migrated, 1);
    assert_eq!(report.transactions.found, 2);
    assert_eq!(report.transactions.migrated, 2);

    assert_eq!(target.count("users").await.unwrap(), 1);
    assert_eq!(target.count("transactions").await.unwrap(), 2);
    for collection in ["users", "admins", "wallets", "matches", "transactions"] {
        assert!(report.backup_dir.join(format!("{collection}.json")).exists());
    }

    let _ = std::fs::remove_dir_all(&dir);
}
