//! Sportsbook: bet slip, wallet ledger, admin console and fixtures feed.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry points.

pub mod config;
pub mod types;
pub mod session;
pub mod store;
pub mod betslip;
pub mod ledger;
pub mod admin;
pub mod feed;
pub mod app;
pub mod api;
pub mod migration;
