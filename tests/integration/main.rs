//! Integration tests: the full sportsbook wired over in-memory stores and
//! a deterministic fixtures feed.

mod betting_flow;
mod mock_feed;
mod persistence;
