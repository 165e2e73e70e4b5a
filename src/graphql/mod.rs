//! GraphQL API with subscriptions for real-time updates
//!
//! Queries and mutations are served over HTTP POST; the `player` subscription is
//! served over WebSocket. Every operation receives the [`RequestContext`] produced
//! by the access guard.

pub mod auth;
mod helpers;
pub mod mutations;
pub mod queries;
mod schema;
mod subscriptions;
pub mod types;

pub use auth::{AuthUser, RequestContext};
pub use schema::{CourtsideSchema, MutationRoot, QueryRoot, ShutdownSignal, build_schema};
pub use subscriptions::SubscriptionRoot;
