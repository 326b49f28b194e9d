//! HTTP API: Axum server over the sportsbook stores.
//!
//! Serves a JSON REST API for the session, wallet, bet slip, fixtures and
//! admin console. CORS enabled for a browser front-end on another origin.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::info;

pub use routes::{ApiError, AppState};

/// Serve the API on `port` until `shutdown` resolves.
pub async fn serve(state: AppState, port: u16, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API port {port}"))?;
    info!(port, "API server listening on http://localhost:{port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Session
        .route("/api/auth/signup", post(routes::sign_up))
        .route("/api/auth/signin", post(routes::sign_in))
        .route("/api/auth/signout", post(routes::sign_out))
        .route("/api/auth/reset", post(routes::password_reset))
        .route("/api/auth/profile", put(routes::update_profile))
        .route("/api/auth/me", get(routes::me))
        // Wallet
        .route("/api/wallet", get(routes::get_balance))
        .route("/api/wallet/transactions", get(routes::get_transactions))
        .route("/api/wallet/deposit", post(routes::deposit))
        .route("/api/wallet/withdraw", post(routes::withdraw))
        // Bet slip
        .route("/api/slip", get(routes::get_slip).delete(routes::clear_slip))
        .route("/api/slip/selections", post(routes::toggle_selection))
        .route("/api/slip/selections/:id", delete(routes::remove_selection))
        .route("/api/slip/mode", put(routes::set_mode))
        .route("/api/slip/stakes/:id", put(routes::update_stake))
        .route("/api/slip/multi-stake", put(routes::update_multi_stake))
        .route("/api/slip/place", post(routes::place_bet))
        // Fixtures
        .route("/api/matches", get(routes::get_matches))
        .route("/api/leagues/:id/results", get(routes::get_league_results))
        // Admin
        .route("/api/admin/status", get(routes::admin_status))
        .route("/api/admin/users", get(routes::admin_users))
        .route("/api/admin/users/:id/status", put(routes::admin_set_user_status))
        .route("/api/admin/matches", get(routes::admin_matches).post(routes::admin_add_match))
        .route(
            "/api/admin/matches/:id",
            put(routes::admin_update_match).delete(routes::admin_delete_match),
        )
        .route("/api/admin/bets", get(routes::admin_bets))
        .route("/api/admin/bets/stats", get(routes::admin_bet_stats))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
