//! GraphQL subscriptions for real-time updates
//!
//! Subscriptions allow clients to receive push updates over WebSocket. Each open
//! subscription is backed by its own fan-out stream; async-graphql drops the stream
//! when the client stops the operation or disconnects, which cancels it.

use async_graphql::{Context, ErrorExtensions, Result, Subscription};
use futures::Stream;

use crate::error::AuthError;
use crate::services::SubscriptionFanout;
use crate::services::events::CREATE_TOPIC;

use super::schema::ShutdownSignal;
use super::types::Player;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Players as they are created
    async fn player(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = Player>> {
        let fanout = ctx.data_unchecked::<SubscriptionFanout>();
        let shutdown = ctx.data_unchecked::<ShutdownSignal>();

        fanout
            .open_with_cancel::<Player>(CREATE_TOPIC, shutdown.child_token())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Could not subscribe to created players");
                AuthError::from(e).extend()
            })
    }
}
