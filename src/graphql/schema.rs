//! GraphQL schema definition with queries, mutations, and subscriptions

use async_graphql::{MergedObject, Schema};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::services::{AuthService, EventPublisher, SubscriptionFanout};

use super::mutations::{AuthMutations, PlayerMutations, UserMutations};
use super::queries::{PlayerQueries, UserQueries};
use super::subscriptions::SubscriptionRoot;

/// The GraphQL schema type
pub type CourtsideSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

#[derive(MergedObject, Default)]
pub struct QueryRoot(PlayerQueries, UserQueries);

#[derive(MergedObject, Default)]
pub struct MutationRoot(AuthMutations, PlayerMutations, UserMutations);

/// Server-wide cancellation; every subscription stream is a child of it
#[derive(Clone, Default)]
pub struct ShutdownSignal(CancellationToken);

impl ShutdownSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self(token)
    }

    pub fn child_token(&self) -> CancellationToken {
        self.0.child_token()
    }

    pub fn trigger(&self) {
        self.0.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Build the GraphQL schema with all resolvers
pub fn build_schema(
    db: Database,
    auth: AuthService,
    events: EventPublisher,
    fanout: SubscriptionFanout,
    shutdown: ShutdownSignal,
) -> CourtsideSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), SubscriptionRoot)
        .data(db)
        .data(auth)
        .data(events)
        .data(fanout)
        .data(shutdown)
        .finish()
}
