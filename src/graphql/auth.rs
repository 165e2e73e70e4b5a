//! GraphQL authentication and authorization
//!
//! The access guard attaches a [`RequestContext`] to every operation. Resolvers that
//! need an identity either call [`AuthExt::auth_user`] or carry `AuthGuard`:
//!
//! ```ignore
//! #[graphql(guard = "AuthGuard")]
//! async fn protected_mutation(&self, ctx: &Context<'_>) -> Result<String> { ... }
//! ```

use async_graphql::{Context, ErrorExtensions, Result};

use crate::error::AuthError;

pub use crate::services::guard::{AuthUser, RequestContext};

/// Extension trait to get the request identity from GraphQL context
pub trait AuthExt {
    /// Get the authenticated user, or fail with `AccessDenied`
    fn auth_user(&self) -> Result<&AuthUser>;

    /// Get the authenticated user if present
    fn try_auth_user(&self) -> Option<&AuthUser>;
}

impl<'a> AuthExt for Context<'a> {
    fn auth_user(&self) -> Result<&AuthUser> {
        self.try_auth_user()
            .ok_or_else(|| AuthError::AccessDenied.extend())
    }

    fn try_auth_user(&self) -> Option<&AuthUser> {
        self.data_opt::<RequestContext>()
            .and_then(|rc| rc.identity.as_ref())
    }
}

/// Guard that requires an identity for GraphQL operations.
pub struct AuthGuard;

impl async_graphql::Guard for AuthGuard {
    fn check(&self, ctx: &Context<'_>) -> impl std::future::Future<Output = Result<()>> + Send {
        let result = ctx.auth_user().map(|_| ());
        async move { result }
    }
}

/// Require that the caller is acting on their own account
pub fn require_self<'a>(ctx: &'a Context<'_>, username: &str) -> Result<&'a AuthUser> {
    let user = ctx.auth_user()?;
    if user.username == username {
        Ok(user)
    } else {
        Err(AuthError::AccessDenied.extend_with(|_, e| e.set("code", "FORBIDDEN")))
    }
}
