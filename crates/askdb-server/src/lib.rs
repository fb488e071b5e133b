//! askdb server library: HTTP routes, configuration and application state.
//!
//! Separated from main.rs so the router can be exercised in integration tests.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
