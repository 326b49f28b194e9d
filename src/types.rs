//! Shared types for the sportsbook.
//!
//! One tagged struct per document collection (`UserProfile`, `Wallet`,
//! `Transaction`, `Match`, `AdminRecord`) plus the bet-slip selection
//! snapshot and the domain error type. Remote records are only ever
//! handled through these types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The signed-in identity as reported by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// Which outcome of a match a selection backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeType {
    #[serde(rename = "teamA")]
    TeamA,
    #[serde(rename = "draw")]
    Draw,
    #[serde(rename = "teamB")]
    TeamB,
}

impl OutcomeType {
    pub const ALL: &'static [OutcomeType] =
        &[OutcomeType::TeamA, OutcomeType::Draw, OutcomeType::TeamB];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeType::TeamA => "teamA",
            OutcomeType::Draw => "draw",
            OutcomeType::TeamB => "teamB",
        }
    }
}

impl fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutcomeType {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teamA" | "home" => Ok(OutcomeType::TeamA),
            "draw" => Ok(OutcomeType::Draw),
            "teamB" | "away" => Ok(OutcomeType::TeamB),
            other => Err(BookError::InvalidSelection(format!("unknown outcome: {other}"))),
        }
    }
}

/// Decimal odds for the three outcomes. Sports without a draw leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOdds {
    pub team_a: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw: Option<Decimal>,
    pub team_b: Decimal,
}

impl MatchOdds {
    /// Odds for a given outcome, if that outcome is offered.
    pub fn for_outcome(&self, outcome: OutcomeType) -> Option<Decimal> {
        match outcome {
            OutcomeType::TeamA => Some(self.team_a),
            OutcomeType::Draw => self.draw,
            OutcomeType::TeamB => Some(self.team_b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Live,
    Completed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Upcoming => write!(f, "upcoming"),
            MatchStatus::Live => write!(f, "live"),
            MatchStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(MatchStatus::Upcoming),
            "live" => Ok(MatchStatus::Live),
            "completed" => Ok(MatchStatus::Completed),
            other => Err(BookError::Malformed(format!("match status: {other}"))),
        }
    }
}

/// A fixture with odds, as stored in the `matches` collection or
/// synthesized from the results feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    /// Document id (empty for feed fixtures that were never stored).
    #[serde(default)]
    pub id: String,
    pub match_id: i64,
    pub sport: String,
    /// Display label, e.g. "Barcelona vs Real Madrid".
    #[serde(rename = "match")]
    pub label: String,
    pub team_a: String,
    pub team_b: String,
    pub time: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub league: String,
    pub odds: MatchOdds,
    #[serde(default)]
    pub status: MatchStatus,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} {}) {:.2}/{}/{:.2}",
            self.league,
            self.label,
            self.sport,
            self.time,
            self.odds.team_a,
            self.odds
                .draw
                .map(|d| format!("{d:.2}"))
                .unwrap_or_else(|| "-".to_string()),
            self.odds.team_b,
        )
    }
}

impl Match {
    /// Display name of an outcome: the team name, or "Draw".
    pub fn outcome_name(&self, outcome: OutcomeType) -> &str {
        match outcome {
            OutcomeType::TeamA => &self.team_a,
            OutcomeType::Draw => "Draw",
            OutcomeType::TeamB => &self.team_b,
        }
    }

    /// Helper to build a test/sample match with sensible defaults.
    #[cfg(test)]
    pub fn sample(match_id: i64, team_a: Decimal, draw: Option<Decimal>, team_b: Decimal) -> Self {
        Match {
            id: format!("doc-{match_id}"),
            match_id,
            sport: "football".to_string(),
            label: "Barcelona vs Real Madrid".to_string(),
            team_a: "Barcelona".to_string(),
            team_b: "Real Madrid".to_string(),
            time: "20:00".to_string(),
            date: None,
            league: "La Liga".to_string(),
            odds: MatchOdds { team_a, draw, team_b },
            status: MatchStatus::Upcoming,
        }
    }
}

/// Fields for creating a match from the admin console.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMatch {
    #[serde(default)]
    pub match_id: Option<i64>,
    pub sport: String,
    #[serde(rename = "match", default)]
    pub label: Option<String>,
    pub team_a: String,
    pub team_b: String,
    pub time: String,
    pub league: String,
    pub odds: MatchOdds,
    #[serde(default)]
    pub status: MatchStatus,
}

/// Partial update applied by an admin to an existing match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchPatch {
    #[serde(default)]
    pub odds: Option<MatchOdds>,
    #[serde(default)]
    pub status: Option<MatchStatus>,
}

// ---------------------------------------------------------------------------
// Bet slip
// ---------------------------------------------------------------------------

/// One chosen outcome for one match, with its odds frozen at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub id: String,
    pub match_id: i64,
    pub sport: String,
    #[serde(rename = "match")]
    pub label: String,
    pub outcome: OutcomeType,
    pub outcome_name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub odds: Decimal,
    pub time: String,
    pub league: String,
}

impl Selection {
    /// Composite key `"{matchId}_{outcome}"`.
    pub fn key(match_id: i64, outcome: OutcomeType) -> String {
        format!("{match_id}_{outcome}")
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} @ {:.2}", self.label, self.outcome_name, self.odds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BetMode {
    #[default]
    Single,
    Multi,
}

impl fmt::Display for BetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetMode::Single => write!(f, "single"),
            BetMode::Multi => write!(f, "multi"),
        }
    }
}

/// Snapshot of one leg of a placed bet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetLeg {
    #[serde(rename = "match")]
    pub label: String,
    pub selection: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub odds: Decimal,
    /// Per-leg stake; only present for single bets.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub stake: Option<Decimal>,
}

/// Detail payload attached to a `bet` transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetDetails {
    pub mode: BetMode,
    pub selections: Vec<BetLeg>,
    /// Accumulator odds at submission; only present for multi bets.
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_odds: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Bet,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "deposit"),
            TransactionType::Withdraw => write!(f, "withdraw"),
            TransactionType::Bet => write!(f, "bet"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "bet" => Ok(TransactionType::Bet),
            other => Err(BookError::Malformed(format!("transaction type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Pending,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            "pending" => Ok(TransactionStatus::Pending),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(BookError::Malformed(format!("transaction status: {other}"))),
        }
    }
}

/// An immutable ledger entry. Created once by a balance-mutating
/// operation and never edited afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bet_details: Option<BetDetails>,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ${:.2} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.kind,
            self.amount,
            self.status,
            self.description,
        )
    }
}

/// A transaction before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDraft {
    pub user_id: String,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub bet_details: Option<BetDetails>,
}

impl TransactionDraft {
    pub fn completed(user_id: &str, kind: TransactionType, amount: Decimal, description: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            kind,
            amount,
            description: description.to_string(),
            status: TransactionStatus::Completed,
            bet_details: None,
        }
    }

    /// Stamp the draft into a stored transaction.
    pub fn into_transaction(self, id: String, timestamp: DateTime<Utc>) -> Transaction {
        Transaction {
            id,
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            timestamp,
            description: self.description,
            status: self.status,
            bet_details: self.bet_details,
        }
    }
}

/// Remote balance record for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: String,
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Users & admins
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Active => write!(f, "active"),
            UserStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            other => Err(BookError::Malformed(format!("user status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdminRole {
    #[default]
    Admin,
    Superadmin,
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminRole::Admin => write!(f, "admin"),
            AdminRole::Superadmin => write!(f, "superadmin"),
        }
    }
}

impl std::str::FromStr for AdminRole {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AdminRole::Admin),
            "superadmin" => Ok(AdminRole::Superadmin),
            other => Err(BookError::Malformed(format!("admin role: {other}"))),
        }
    }
}

/// Role record in the `admins` collection, keyed by uid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminRecord {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: AdminRole,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors surfaced to the initiating action. None are fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookError {
    #[error("Amount must be greater than 0")]
    InvalidAmount,

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("You must be logged in")]
    NotAuthenticated,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Balance changed concurrently, please retry")]
    Conflict,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already in use: {0}")]
    EmailInUse(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

pub type BookResult<T> = Result<T, BookError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
