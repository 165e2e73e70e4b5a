//! Access guard: resolves the inbound credential of a request to an identity.
//!
//! A missing credential is not an error; the request continues anonymously so public
//! queries keep working. A credential that is present must be valid, otherwise the
//! request is rejected before any handler runs. The guard never decides whether an
//! operation needs an identity; handlers check [`RequestContext::identity`] themselves.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::services::auth::AuthService;

/// Identity resolved for the current request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

/// Per-request context threaded into every GraphQL operation
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<AuthUser>,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authorized(user: AuthUser) -> Self {
        Self {
            identity: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

/// Extract the raw credential from the `Authorization` header.
///
/// Accepts either a bare token or `Bearer <token>`; blank values count as absent.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned())
        .and_then(|h| normalize_credential(&h))
}

/// Strip an optional `Bearer ` prefix and surrounding whitespace
pub fn normalize_credential(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[derive(Clone)]
pub struct AccessGuard {
    auth: AuthService,
}

impl AccessGuard {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }

    /// Run the guard for one request.
    ///
    /// Unauthenticated -> TokenPresent -> IdentityResolved -> Authorized. A valid token
    /// whose user has since been deleted degrades to anonymous.
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<RequestContext, AuthError> {
        let Some(token) = credential.and_then(normalize_credential) else {
            return Ok(RequestContext::anonymous());
        };

        let username = self.auth.validate_token(&token)?;

        match self.auth.db().users().get_id_by_username(&username).await {
            Ok(Some(user_id)) => {
                tracing::debug!(%user_id, %username, "Request authorized");
                Ok(RequestContext::authorized(AuthUser { user_id, username }))
            }
            Ok(None) => {
                tracing::warn!(%username, "Token identity no longer exists; continuing anonymously");
                Ok(RequestContext::anonymous())
            }
            Err(e) => {
                tracing::error!(error = %e, "Identity lookup failed");
                Err(AuthError::Transport(e.to_string()))
            }
        }
    }
}

/// Axum middleware running [`AccessGuard`] and storing the resulting
/// [`RequestContext`] in the request extensions
pub async fn access_guard_middleware(
    State(guard): State<AccessGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let credential = extract_credential(request.headers());
    let context = guard.authenticate(credential.as_deref()).await.inspect_err(|e| {
        tracing::info!(error = %e, path = %request.uri().path(), "Request rejected by access guard");
    })?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::services::auth::AuthConfig;
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};

    async fn guard() -> (AccessGuard, AuthService) {
        let db = Database::in_memory().await.unwrap();
        let auth = AuthService::new(db, AuthConfig::new("guard-secret").with_bcrypt_cost(4));
        (AccessGuard::new(auth.clone()), auth)
    }

    #[test]
    fn test_extract_credential() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("   "));
        assert_eq!(extract_credential(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("abc.def.ghi"));
        assert_eq!(extract_credential(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[tokio::test]
    async fn test_no_credential_is_anonymous() {
        let (guard, _) = guard().await;
        let ctx = guard.authenticate(None).await.unwrap();
        assert!(!ctx.is_authenticated());
        let ctx = guard.authenticate(Some("")).await.unwrap();
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_malformed_credential_is_rejected() {
        let (guard, _) = guard().await;
        assert_matches!(
            guard.authenticate(Some("garbage")).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn test_expired_credential_is_rejected() {
        let (guard, auth) = guard().await;
        auth.register("alice", "pw").await.unwrap();
        let stale = auth
            .issue_token_at("alice", Utc::now() - Duration::hours(48))
            .unwrap();
        assert_matches!(
            guard.authenticate(Some(&stale.token)).await,
            Err(AuthError::InvalidToken)
        );
    }

    #[tokio::test]
    async fn test_valid_credential_resolves_identity() {
        let (guard, auth) = guard().await;
        let token = auth.register("alice", "pw").await.unwrap().token;
        let id = auth.db().users().get_id_by_username("alice").await.unwrap().unwrap();

        let ctx = guard
            .authenticate(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(
            ctx.identity,
            Some(AuthUser {
                user_id: id,
                username: "alice".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_deleted_identity_degrades_to_anonymous() {
        let (guard, auth) = guard().await;
        let token = auth.register("alice", "pw").await.unwrap().token;
        auth.db().users().delete_by_username("alice").await.unwrap();

        let ctx = guard.authenticate(Some(&token)).await.unwrap();
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_store_failure_is_transport_error() {
        let (guard, auth) = guard().await;
        let token = auth.issue_token("alice").unwrap().token;
        auth.db().close().await;

        assert_matches!(
            guard.authenticate(Some(&token)).await,
            Err(AuthError::Transport(_))
        );
    }
}
