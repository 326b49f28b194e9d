//! Results feed.
//!
//! Fixtures come from a read-only sports results API that carries no
//! prices, so odds are synthesized per sport when events are converted
//! into `Match` values.

pub mod sportsdb;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{BookError, BookResult, Match, MatchOdds, MatchStatus};

pub use sportsdb::SportsDbFeed;

/// Sport codes polled for the match list.
pub const POLLED_SPORTS: [&str; 2] = ["Soccer", "Cricket"];

/// One fixture as reported by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    #[serde(rename = "idEvent")]
    pub id: String,
    #[serde(rename = "strSport")]
    pub sport: String,
    #[serde(rename = "strLeague", default)]
    pub league: String,
    #[serde(rename = "strHomeTeam", default)]
    pub home_team: Option<String>,
    #[serde(rename = "strAwayTeam", default)]
    pub away_team: Option<String>,
    #[serde(rename = "strTime", default)]
    pub time: Option<String>,
    #[serde(rename = "dateEvent", default)]
    pub date: Option<String>,
}

/// Read-only source of fixtures.
///
/// Implementations swallow transport errors and return an empty list, so
/// a flaky feed degrades to "no matches" rather than an error page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultsFeed: Send + Sync {
    /// Fixtures on `date` for a feed sport code such as "Soccer".
    async fn events_for_day(&self, date: NaiveDate, sport: &str) -> Vec<FeedEvent>;

    /// Recent results of one league.
    async fn past_league_events(&self, league_id: &str) -> Vec<FeedEvent>;
}

// ---------------------------------------------------------------------------
// Odds synthesis
// ---------------------------------------------------------------------------

/// Price ranges in hundredths: `(side_lo, side_hi, draw range)`.
fn odds_ranges(sport: &str) -> ((i64, i64), Option<(i64, i64)>) {
    if sport.eq_ignore_ascii_case("soccer") {
        ((150, 450), Some((250, 450)))
    } else if sport.eq_ignore_ascii_case("cricket") {
        ((140, 340), Some((350, 650)))
    } else {
        ((130, 330), None)
    }
}

/// Random two-decimal odds for a feed sport code.
pub fn synthesize_odds<R: Rng + ?Sized>(sport: &str, rng: &mut R) -> MatchOdds {
    let (side, draw) = odds_ranges(sport);
    let mut price = |(lo, hi): (i64, i64)| Decimal::new(rng.gen_range(lo..hi), 2);
    let team_a = price(side);
    let draw = draw.map(&mut price);
    let team_b = price(side);
    MatchOdds { team_a, draw, team_b }
}

/// Our sport name for a feed sport code.
pub fn normalize_sport(feed_sport: &str) -> String {
    let lower = feed_sport.to_lowercase();
    if lower == "soccer" {
        "football".to_string()
    } else {
        lower
    }
}

/// Convert a feed event into a priced `Match` scheduled on `date`.
/// Events without both team names are rejected.
pub fn event_to_match<R: Rng + ?Sized>(event: &FeedEvent, date: NaiveDate, rng: &mut R) -> BookResult<Match> {
    let match_id: i64 = event
        .id
        .trim()
        .parse()
        .map_err(|_| BookError::Malformed(format!("event id {:?}", event.id)))?;
    let team = |name: &Option<String>| {
        name.as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BookError::Malformed(format!("event {} is missing a team", event.id)))
    };
    let home = team(&event.home_team)?;
    let away = team(&event.away_team)?;

    Ok(Match {
        id: event.id.clone(),
        match_id,
        sport: normalize_sport(&event.sport),
        label: format!("{home} vs {away}"),
        team_a: home,
        team_b: away,
        time: event
            .time
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "00:00".to_string()),
        date: Some(date),
        league: event.league.clone(),
        odds: synthesize_odds(&event.sport, rng),
        status: MatchStatus::Upcoming,
    })
}

/// Price a batch of events for one day, dropping malformed ones.
pub fn convert_events<R: Rng + ?Sized>(events: &[FeedEvent], date: NaiveDate, rng: &mut R) -> Vec<Match> {
    events
        .iter()
        .filter_map(|event| match event_to_match(event, date, rng) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(id = %event.id, error = %e, "Skipping feed event");
                None
            }
        })
        .collect()
}

/// Soccer and cricket fixtures for `today` and the following day, fetched
/// concurrently. Today's fixtures come first.
pub async fn fetch_matches(feed: &dyn ResultsFeed, today: NaiveDate) -> Vec<Match> {
    let tomorrow = today.succ_opt().unwrap_or(today);
    let [soccer, cricket] = POLLED_SPORTS;

    let (today_soccer, today_cricket, tomorrow_soccer, tomorrow_cricket) = futures::join!(
        feed.events_for_day(today, soccer),
        feed.events_for_day(today, cricket),
        feed.events_for_day(tomorrow, soccer),
        feed.events_for_day(tomorrow, cricket)
    );

    let mut rng = rand::thread_rng();
    let mut matches = Vec::new();
    for (events, date) in [
        (today_soccer, today),
        (today_cricket, today),
        (tomorrow_soccer, tomorrow),
        (tomorrow_cricket, tomorrow),
    ] {
        matches.extend(convert_events(&events, date, &mut rng));
    }

    debug!(%today, count = matches.len(), "Fetched fixtures");
    matches
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
