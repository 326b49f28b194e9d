//! TheSportsDB client.
//!
//! API: `{base}/{key}/eventsday.php?d=YYYY-MM-DD&s={sport}` and
//! `{base}/{key}/eventspastleague.php?id={league}`.
//! Auth: the key is a path segment. The free tier key is "3".
//!
//! Both endpoints answer `{"events": [...]}`, with `null` instead of an
//! empty list when there is nothing to report.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FeedEvent, ResultsFeed};

/// Key used when none is configured.
pub const FREE_TIER_KEY: &str = "3";

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Option<Vec<FeedEvent>>,
}

pub struct SportsDbFeed {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SportsDbFeed {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sportsbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build results feed HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.unwrap_or_else(|| FREE_TIER_KEY.to_string()),
        })
    }

    fn day_url(&self, date: NaiveDate, sport: &str) -> String {
        format!(
            "{}/{}/eventsday.php?d={}&s={}",
            self.base_url,
            self.api_key,
            date.format("%Y-%m-%d"),
            urlencoding::encode(sport),
        )
    }

    fn league_url(&self, league_id: &str) -> String {
        format!(
            "{}/{}/eventspastleague.php?id={}",
            self.base_url,
            self.api_key,
            urlencoding::encode(league_id),
        )
    }

    async fn get_events(&self, url: &str) -> Result<Vec<FeedEvent>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("Results feed request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Results feed error: {status}");
        }

        let body = resp.text().await.context("Failed to read results feed body")?;
        parse_events(&body)
    }
}

/// Decode an events payload, treating `null` as no events.
fn parse_events(body: &str) -> Result<Vec<FeedEvent>> {
    let data: EventsResponse =
        serde_json::from_str(body).context("Failed to parse results feed response")?;
    Ok(data.events.unwrap_or_default())
}

#[async_trait]
impl ResultsFeed for SportsDbFeed {
    async fn events_for_day(&self, date: NaiveDate, sport: &str) -> Vec<FeedEvent> {
        match self.get_events(&self.day_url(date, sport)).await {
            Ok(events) => {
                debug!(%date, sport, count = events.len(), "Feed events fetched");
                events
            }
            Err(e) => {
                warn!(%date, sport, error = %e, "Error fetching events");
                Vec::new()
            }
        }
    }

    async fn past_league_events(&self, league_id: &str) -> Vec<FeedEvent> {
        match self.get_events(&self.league_url(league_id)).await {
            Ok(events) => events,
            Err(e) => {
                warn!(league_id, error = %e, "Error fetching league events");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
