//! GraphQL authentication mutations
//!
//! None of these require an existing identity: they are how a client obtains one.

use super::prelude::*;

#[derive(Default)]
pub struct AuthMutations;

#[Object]
impl AuthMutations {
    /// Authenticate with username and password
    async fn login(&self, ctx: &Context<'_>, input: InputUser) -> Result<TokenPayload> {
        let auth = ctx.data_unchecked::<AuthService>();

        match auth.login(&input.username, &input.password).await {
            Ok(token) => {
                tracing::info!(username = %input.username, "User logged in");
                Ok(token.into())
            }
            Err(e) => {
                tracing::warn!(username = %input.username, error = %e, "Login failed");
                Err(e.extend())
            }
        }
    }

    /// Exchange a still-valid token for a fresh one
    async fn refresh_token(&self, ctx: &Context<'_>, token: String) -> Result<TokenPayload> {
        let auth = ctx.data_unchecked::<AuthService>();
        let token = auth.refresh(&token).await.map_err(|e| {
            tracing::debug!(error = %e, "Token refresh failed");
            e.extend()
        })?;
        Ok(token.into())
    }

    /// Register a new account and return its first token
    async fn create_user(&self, ctx: &Context<'_>, input: InputUser) -> Result<TokenPayload> {
        if input.username.trim().is_empty() || input.password.is_empty() {
            return Err(async_graphql::Error::new("Username and password are required")
                .extend_with(|_, e| e.set("code", "BAD_USER_INPUT")));
        }

        let auth = ctx.data_unchecked::<AuthService>();
        let token = auth
            .register(&input.username, &input.password)
            .await
            .map_err(|e| {
                tracing::warn!(username = %input.username, error = %e, "Registration failed");
                e.extend()
            })?;
        Ok(token.into())
    }
}
