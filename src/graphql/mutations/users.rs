//! Account mutations. A user may only change their own account.

use super::prelude::*;

#[derive(Default)]
pub struct UserMutations;

#[Object]
impl UserMutations {
    /// Rename the caller's account. Returns a token for the new username, since
    /// tokens naming the old one no longer resolve to an identity.
    #[graphql(guard = "AuthGuard")]
    async fn update_username(
        &self,
        ctx: &Context<'_>,
        input: UpdateUsername,
    ) -> Result<TokenPayload> {
        let user = require_self(ctx, &input.old_username)?;
        let db = ctx.data_unchecked::<Database>();
        let auth = ctx.data_unchecked::<AuthService>();
        let users = db.users();

        if users
            .get_id_by_username(&input.new_username)
            .await
            .map_err(internal_error)?
            .is_some()
        {
            return Err(AuthError::UsernameTaken(input.new_username).extend());
        }

        users
            .update_username(&user.user_id, &input.new_username)
            .await
            .map_err(|e| {
                if e.is::<AlreadyExists>() {
                    AuthError::UsernameTaken(input.new_username.clone()).extend()
                } else {
                    internal_error(e)
                }
            })?;

        tracing::info!(
            user_id = %user.user_id,
            old_username = %input.old_username,
            new_username = %input.new_username,
            "Username updated"
        );

        let token = auth.issue_token(&input.new_username).map_err(|e| e.extend())?;
        Ok(token.into())
    }

    /// Set a new password for the caller's account
    #[graphql(guard = "AuthGuard")]
    async fn update_password(&self, ctx: &Context<'_>, input: UpdatePassword) -> Result<String> {
        let user = require_self(ctx, &input.username)?;
        let auth = ctx.data_unchecked::<AuthService>();

        if input.new_password.is_empty() {
            return Err(async_graphql::Error::new("Password must not be empty")
                .extend_with(|_, e| e.set("code", "BAD_USER_INPUT")));
        }

        let changed = auth
            .set_password(&user.user_id, &input.new_password)
            .await
            .map_err(|e| e.extend())?;
        if !changed {
            return Err(not_found("user", &input.username));
        }

        tracing::info!(user_id = %user.user_id, "Password updated");
        Ok(format!("Successfully updated password for user id - {}", user.user_id))
    }

    /// Delete the caller's account
    #[graphql(guard = "AuthGuard")]
    async fn delete_user(&self, ctx: &Context<'_>, username: String) -> Result<String> {
        let user = require_self(ctx, &username)?;
        let db = ctx.data_unchecked::<Database>();

        if !db
            .users()
            .delete_by_username(&username)
            .await
            .map_err(internal_error)?
        {
            return Err(not_found("user", &username));
        }

        tracing::info!(user_id = %user.user_id, %username, "User deleted");
        Ok(format!("Deleted user {}", username))
    }
}
