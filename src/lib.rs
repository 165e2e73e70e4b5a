//! Courtside - GraphQL API for player statistics
//!
//! JWT-authenticated CRUD over players and users, with newly created players pushed
//! to live subscribers through a publish/subscribe transport.

pub mod api;
pub mod app;
pub mod bus;
pub mod config;
pub mod db;
pub mod error;
pub mod graphql;
pub mod services;

pub use app::{AppState, build_app};
pub use config::Config;
