//! Helper functions shared across GraphQL query/mutation modules.

use async_graphql::ErrorExtensions;

use crate::db::PlayerRecord;
use crate::graphql::types::Player;

/// Wrap a store or service failure as a GraphQL error with an `INTERNAL` code
pub(crate) fn internal_error(e: impl std::fmt::Display) -> async_graphql::Error {
    async_graphql::Error::new(e.to_string()).extend_with(|_, ext| ext.set("code", "INTERNAL"))
}

/// Error for a lookup that found nothing
pub(crate) fn not_found(what: &str, key: &str) -> async_graphql::Error {
    async_graphql::Error::new(format!("{} '{}' not found", what, key))
        .extend_with(|_, ext| ext.set("code", "NOT_FOUND"))
}

/// Error for a write that collided with an existing key
pub(crate) fn conflict(what: &str, key: &str) -> async_graphql::Error {
    async_graphql::Error::new(format!("{} '{}' already exists", what, key))
        .extend_with(|_, ext| ext.set("code", "CONFLICT"))
}

/// Convert a stored player row to its GraphQL type
pub(crate) fn player_from_record(record: PlayerRecord) -> async_graphql::Result<Player> {
    Player::try_from(record).map_err(internal_error)
}
