use super::prelude::*;

#[derive(Default)]
pub struct PlayerQueries;

#[Object]
impl PlayerQueries {
    /// Look up a player by name. Public.
    async fn player(&self, ctx: &Context<'_>, name: String) -> Result<Option<Player>> {
        let db = ctx.data_unchecked::<Database>();
        let record = db.players().get(&name).await.map_err(internal_error)?;
        record.map(player_from_record).transpose()
    }
}
