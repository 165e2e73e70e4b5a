//! Player mutations. All of them require an identity.

use super::prelude::*;
use crate::services::events::CREATE_TOPIC;

#[derive(Default)]
pub struct PlayerMutations;

#[Object]
impl PlayerMutations {
    /// Store a new player and announce it to `player` subscribers
    #[graphql(guard = "AuthGuard")]
    async fn create_player(&self, ctx: &Context<'_>, player: InputPlayer) -> Result<Player> {
        let user = ctx.auth_user()?;
        let db = ctx.data_unchecked::<Database>();
        let events = ctx.data_unchecked::<EventPublisher>();

        let player = Player::from(player);
        let players = db.players();

        if players.get(&player.name).await.map_err(internal_error)?.is_some() {
            return Err(conflict("player", &player.name));
        }

        players
            .create(&PlayerRecord::from(&player))
            .await
            .map_err(|e| {
                if e.is::<AlreadyExists>() {
                    conflict("player", &player.name)
                } else {
                    internal_error(e)
                }
            })?;

        tracing::info!(player = %player.name, created_by = %user.username, "Player created");

        // Delivery to subscribers is best effort and does not affect the mutation
        events.publish(CREATE_TOPIC, &player).await;

        Ok(player)
    }

    /// Update the given fields of an existing player
    #[graphql(guard = "AuthGuard")]
    async fn update_player(&self, ctx: &Context<'_>, player: InputUpdatePlayer) -> Result<Player> {
        let db = ctx.data_unchecked::<Database>();
        let name = player.name.clone();

        let updated = db
            .players()
            .update(&name, PlayerPatch::from(player))
            .await
            .map_err(internal_error)?
            .ok_or_else(|| not_found("player", &name))?;

        tracing::info!(player = %name, "Player updated");
        player_from_record(updated)
    }

    /// Delete a player, returning it as it was
    #[graphql(guard = "AuthGuard")]
    async fn delete_player(&self, ctx: &Context<'_>, name: String) -> Result<Player> {
        let db = ctx.data_unchecked::<Database>();
        let players = db.players();

        let existing = players
            .get(&name)
            .await
            .map_err(internal_error)?
            .ok_or_else(|| not_found("player", &name))?;
        players.delete(&name).await.map_err(internal_error)?;

        tracing::info!(player = %name, "Player deleted");
        player_from_record(existing)
    }
}
