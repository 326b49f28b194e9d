//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<Sportsbook>`.
//! Domain errors map to status codes in `ApiError`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::admin::{AdminStatus, BetStats, StatsRange};
use crate::app::{PlacedBet, Sportsbook};
use crate::betslip::{BetSlip, Toggle};
use crate::feed::FeedEvent;
use crate::types::{
    BetMode, BookError, Identity, Match, MatchPatch, NewMatch, OutcomeType, Transaction,
    UserProfile, UserStatus,
};

pub type AppState = Arc<Sportsbook>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A `BookError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BookError);

impl From<BookError> for ApiError {
    fn from(e: BookError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BookError::InvalidAmount | BookError::InvalidSelection(_) => StatusCode::BAD_REQUEST,
            BookError::NotAuthenticated | BookError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            BookError::Unauthorized => StatusCode::FORBIDDEN,
            BookError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookError::Conflict | BookError::EmailInUse(_) => StatusCode::CONFLICT,
            BookError::NotFound(_) => StatusCode::NOT_FOUND,
            BookError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BookError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub identity: Option<Identity>,
    pub admin: AdminStatus,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WalletChange {
    pub transaction: Transaction,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub match_id: i64,
    pub outcome: OutcomeType,
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: BetMode,
}

/// A stake as typed by the user: a number, or free text where anything
/// non-numeric counts as zero.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StakeValue {
    Amount(Decimal),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct StakeRequest {
    pub stake: StakeValue,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub range: StatsRange,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: UserStatus,
}

/// Slip plus its derived totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipView {
    #[serde(flatten)]
    pub slip: BetSlip,
    pub accumulator_odds: Decimal,
    pub total_stake: Decimal,
    pub potential_winnings: Decimal,
}

impl From<BetSlip> for SlipView {
    fn from(slip: BetSlip) -> Self {
        Self {
            accumulator_odds: slip.accumulator_odds(),
            total_stake: slip.total_stake(),
            potential_winnings: slip.potential_winnings(),
            slip,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// "added" or "removed".
    pub action: &'static str,
    pub id: String,
    pub slip: SlipView,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// POST /api/auth/signup
pub async fn sign_up(State(app): State<AppState>, Json(req): Json<SignUpRequest>) -> ApiResult<Identity> {
    let password = SecretString::new(req.password);
    Ok(Json(app.sign_up(&req.email, &password, &req.display_name).await?))
}

/// POST /api/auth/signin
pub async fn sign_in(State(app): State<AppState>, Json(req): Json<SignInRequest>) -> ApiResult<Identity> {
    let password = SecretString::new(req.password);
    Ok(Json(app.sign_in(&req.email, &password).await?))
}

/// POST /api/auth/signout
pub async fn sign_out(State(app): State<AppState>) -> Result<StatusCode, ApiError> {
    app.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/auth/reset
pub async fn password_reset(State(app): State<AppState>, Json(req): Json<ResetRequest>) -> Result<StatusCode, ApiError> {
    app.send_password_reset(&req.email).await?;
    Ok(StatusCode::ACCEPTED)
}

/// PUT /api/auth/profile
pub async fn update_profile(State(app): State<AppState>, Json(req): Json<ProfileRequest>) -> ApiResult<Identity> {
    Ok(Json(app.update_display_name(&req.display_name).await?))
}

/// GET /api/auth/me
pub async fn me(State(app): State<AppState>) -> Json<MeResponse> {
    Json(MeResponse {
        identity: app.session.current(),
        admin: app.admin.status().await,
    })
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// GET /api/wallet
pub async fn get_balance(State(app): State<AppState>) -> ApiResult<BalanceResponse> {
    let balance = app.ledger.balance().await?;
    Ok(Json(BalanceResponse { balance }))
}

/// GET /api/wallet/transactions
pub async fn get_transactions(State(app): State<AppState>) -> ApiResult<Vec<Transaction>> {
    Ok(Json(app.ledger.transactions().await?))
}

/// POST /api/wallet/deposit
pub async fn deposit(State(app): State<AppState>, Json(req): Json<AmountRequest>) -> ApiResult<WalletChange> {
    let transaction = app.ledger.deposit(req.amount).await?;
    Ok(Json(WalletChange {
        transaction,
        balance: app.ledger.cached_balance().await,
    }))
}

/// POST /api/wallet/withdraw
pub async fn withdraw(State(app): State<AppState>, Json(req): Json<AmountRequest>) -> ApiResult<WalletChange> {
    let transaction = app.ledger.withdraw(req.amount).await?;
    Ok(Json(WalletChange {
        transaction,
        balance: app.ledger.cached_balance().await,
    }))
}

// ---------------------------------------------------------------------------
// Bet slip
// ---------------------------------------------------------------------------

/// GET /api/slip
pub async fn get_slip(State(app): State<AppState>) -> Json<SlipView> {
    Json(app.slip.snapshot().await.into())
}

/// DELETE /api/slip
pub async fn clear_slip(State(app): State<AppState>) -> Json<SlipView> {
    app.slip.clear().await;
    Json(app.slip.snapshot().await.into())
}

/// POST /api/slip/selections
pub async fn toggle_selection(
    State(app): State<AppState>,
    Json(req): Json<SelectionRequest>,
) -> ApiResult<ToggleResponse> {
    let m: Match = app
        .find_match(req.match_id)
        .await?
        .ok_or_else(|| BookError::NotFound(format!("match {}", req.match_id)))?;

    let (action, id) = match app.slip.add_or_toggle_selection(&m, req.outcome).await? {
        Toggle::Added(selection) => ("added", selection.id),
        Toggle::Removed(id) => ("removed", id),
    };
    Ok(Json(ToggleResponse {
        action,
        id,
        slip: app.slip.snapshot().await.into(),
    }))
}

/// DELETE /api/slip/selections/:id
pub async fn remove_selection(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<SlipView> {
    if !app.slip.remove_selection(&id).await {
        return Err(BookError::NotFound(format!("selection {id}")).into());
    }
    Ok(Json(app.slip.snapshot().await.into()))
}

/// PUT /api/slip/mode
///
/// Multi mode needs at least two selections.
pub async fn set_mode(State(app): State<AppState>, Json(req): Json<ModeRequest>) -> ApiResult<SlipView> {
    if req.mode == BetMode::Multi && app.slip.snapshot().await.len() < 2 {
        return Err(BookError::InvalidSelection("multi bets need at least two selections".into()).into());
    }
    app.slip.set_mode(req.mode).await;
    Ok(Json(app.slip.snapshot().await.into()))
}

/// PUT /api/slip/stakes/:id
pub async fn update_stake(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<SlipView> {
    if !app.slip.snapshot().await.contains(&id) {
        return Err(BookError::NotFound(format!("selection {id}")).into());
    }
    match req.stake {
        StakeValue::Amount(amount) => app.slip.update_stake(&id, amount).await,
        StakeValue::Text(text) => app.slip.update_stake_input(&id, &text).await,
    };
    Ok(Json(app.slip.snapshot().await.into()))
}

/// PUT /api/slip/multi-stake
pub async fn update_multi_stake(State(app): State<AppState>, Json(req): Json<StakeRequest>) -> Json<SlipView> {
    match req.stake {
        StakeValue::Amount(amount) => app.slip.update_multi_stake(amount).await,
        StakeValue::Text(text) => app.slip.update_multi_stake_input(&text).await,
    };
    Json(app.slip.snapshot().await.into())
}

/// POST /api/slip/place
pub async fn place_bet(State(app): State<AppState>) -> ApiResult<PlacedBet> {
    Ok(Json(app.place_bet().await?))
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// GET /api/matches?date=YYYY-MM-DD
pub async fn get_matches(State(app): State<AppState>, Query(q): Query<DateQuery>) -> ApiResult<Vec<Match>> {
    Ok(Json(app.matches(q.date).await?))
}

/// GET /api/leagues/:id/results
pub async fn get_league_results(State(app): State<AppState>, Path(id): Path<String>) -> Json<Vec<FeedEvent>> {
    Json(app.league_results(&id).await)
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// GET /api/admin/status
pub async fn admin_status(State(app): State<AppState>) -> Json<AdminStatus> {
    Json(app.admin.status().await)
}

/// GET /api/admin/users
pub async fn admin_users(State(app): State<AppState>) -> ApiResult<Vec<UserProfile>> {
    Ok(Json(app.admin.users().await?))
}

/// GET /api/admin/matches
pub async fn admin_matches(State(app): State<AppState>) -> ApiResult<Vec<Match>> {
    Ok(Json(app.admin.matches().await?))
}

/// GET /api/admin/bets
pub async fn admin_bets(State(app): State<AppState>) -> ApiResult<Vec<Transaction>> {
    Ok(Json(app.admin.bets().await?))
}

/// GET /api/admin/bets/stats?range=today|week|month|all
pub async fn admin_bet_stats(
    State(app): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> ApiResult<BetStats> {
    Ok(Json(app.admin.bet_stats(q.range).await?))
}

/// POST /api/admin/matches
pub async fn admin_add_match(
    State(app): State<AppState>,
    Json(new_match): Json<NewMatch>,
) -> Result<(StatusCode, Json<Match>), ApiError> {
    let created = app.admin.add_match(new_match).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/admin/matches/:id
pub async fn admin_update_match(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<MatchPatch>,
) -> ApiResult<Match> {
    Ok(Json(app.admin.update_match(&id, patch).await?))
}

/// DELETE /api/admin/matches/:id
pub async fn admin_delete_match(State(app): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    app.admin.delete_match(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/admin/users/:id/status
pub async fn admin_set_user_status(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<UserProfile> {
    Ok(Json(app.admin.set_user_status(&id, req.status).await?))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
