//! Error taxonomy for authentication and the event pipeline.

use async_graphql::ErrorExtensions;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Errors raised by the credential service and the access guard
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or unusable configuration; fatal at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Bad signature, malformed token, wrong algorithm or expired
    #[error("invalid token")]
    InvalidToken,

    /// Handler requires an identity and the request has none
    #[error("access denied")]
    AccessDenied,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("failed to hash secret: {0}")]
    Hashing(String),

    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Store or bus unreachable
    #[error("transport error: {0}")]
    Transport(String),
}

impl AuthError {
    /// Machine-readable code exposed in GraphQL error extensions
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken | AuthError::AccessDenied => "UNAUTHORIZED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::UsernameTaken(_) => "CONFLICT",
            AuthError::Transport(_) => "UNAVAILABLE",
            AuthError::Configuration(_) | AuthError::Hashing(_) | AuthError::Signing(_) => {
                "INTERNAL"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidToken | AuthError::AccessDenied => StatusCode::FORBIDDEN,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::UsernameTaken(_) => StatusCode::CONFLICT,
            AuthError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorExtensions for AuthError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("code", self.code()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Errors raised by a pub/sub transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("transport is closed")]
    Closed,

    #[error("invalid topic '{0}'")]
    InvalidTopic(String),
}

/// Errors decoding or encoding change events
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported event version {0}")]
    UnsupportedVersion(u32),
}

impl From<BusError> for AuthError {
    fn from(e: BusError) -> Self {
        AuthError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graphql_extension_carries_code() {
        let err = AuthError::AccessDenied.extend();
        assert_eq!(err.message, "access denied");
        let code = err
            .extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .cloned();
        assert_eq!(code, Some(async_graphql::Value::from("UNAUTHORIZED")));
    }

    #[test]
    fn test_invalid_token_maps_to_forbidden() {
        let response = AuthError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
