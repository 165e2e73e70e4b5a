pub mod auth;
pub mod players;
pub mod users;

pub use auth::AuthMutations;
pub use players::PlayerMutations;
pub use users::UserMutations;

pub(crate) mod prelude {
    pub(crate) use async_graphql::{Context, ErrorExtensions, Object, Result};

    pub(crate) use crate::db::*;
    pub(crate) use crate::error::AuthError;
    pub(crate) use crate::graphql::auth::{AuthExt, AuthGuard, require_self};
    pub(crate) use crate::graphql::helpers::*;
    pub(crate) use crate::graphql::types::*;
    pub(crate) use crate::services::{AuthService, EventPublisher};
}
