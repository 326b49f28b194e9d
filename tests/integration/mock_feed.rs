//! Mock results feed for integration testing.
//!
//! Provides a deterministic `ResultsFeed` that serves known fixtures per
//! (date, sport) and records every request, with no network access.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sportsbook::feed::{FeedEvent, ResultsFeed};

/// A fixtures feed fully controllable from test code.
#[derive(Clone, Default)]
pub struct MockFeed {
    events: Arc<Mutex<HashMap<(NaiveDate, String), Vec<FeedEvent>>>>,
    league: Arc<Mutex<Vec<FeedEvent>>>,
    requests: Arc<Mutex<Vec<String>>>,
    /// When set, every call returns nothing, like an unreachable feed.
    offline: Arc<Mutex<bool>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `events` for `sport` on `date`.
    pub fn add_events(&self, date: NaiveDate, sport: &str, events: Vec<FeedEvent>) {
        self.events
            .lock()
            .unwrap()
            .entry((date, sport.to_string()))
            .or_default()
            .extend(events);
    }

    pub fn set_league_results(&self, events: Vec<FeedEvent>) {
        *self.league.lock().unwrap() = events;
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// Requests seen so far, as "day:{date}:{sport}" or "league:{id}".
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// A fixture in TheSportsDB shape.
    pub fn event(id: u32, sport: &str, home: &str, away: &str, time: Option<&str>) -> FeedEvent {
        FeedEvent {
            id: id.to_string(),
            sport: sport.to_string(),
            league: format!("{sport} League"),
            home_team: Some(home.to_string()),
            away_team: Some(away.to_string()),
            time: time.map(str::to_string),
            date: None,
        }
    }
}

#[async_trait]
impl ResultsFeed for MockFeed {
    async fn events_for_day(&self, date: NaiveDate, sport: &str) -> Vec<FeedEvent> {
        self.requests.lock().unwrap().push(format!("day:{date}:{sport}"));
        if *self.offline.lock().unwrap() {
            return Vec::new();
        }
        self.events
            .lock()
            .unwrap()
            .get(&(date, sport.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    async fn past_league_events(&self, league_id: &str) -> Vec<FeedEvent> {
        self.requests.lock().unwrap().push(format!("league:{league_id}"));
        if *self.offline.lock().unwrap() {
            return Vec::new();
        }
        self.league.lock().unwrap().clone()
    }
}
