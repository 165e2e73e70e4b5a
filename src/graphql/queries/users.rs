use super::prelude::*;

#[derive(Default)]
pub struct UserQueries;

#[Object]
impl UserQueries {
    /// The account attached to the current request, if any
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let Some(auth) = ctx.try_auth_user() else {
            return Ok(None);
        };
        let db = ctx.data_unchecked::<Database>();
        let user = db
            .users()
            .get_by_username(&auth.username)
            .await
            .map_err(internal_error)?;
        Ok(user.map(User::from))
    }

    /// Look up an account by username. Public.
    async fn user(&self, ctx: &Context<'_>, username: String) -> Result<Option<User>> {
        let db = ctx.data_unchecked::<Database>();
        let user = db
            .users()
            .get_by_username(&username)
            .await
            .map_err(internal_error)?;
        Ok(user.map(User::from))
    }

    /// Resolve a username to its account id. Public.
    #[graphql(name = "getUserId")]
    async fn user_id(&self, ctx: &Context<'_>, username: String) -> Result<String> {
        let db = ctx.data_unchecked::<Database>();
        db.users()
            .get_id_by_username(&username)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| not_found("user", &username))
    }
}
