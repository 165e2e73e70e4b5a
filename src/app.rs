//! Application state and HTTP router construction.
//!
//! Shared by the server binary and the integration tests.

use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{Data, ErrorExtensions};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router, middleware};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bus::Transport;
use crate::config::Config;
use crate::db::Database;
use crate::error::AuthError;
use crate::graphql::{CourtsideSchema, RequestContext, ShutdownSignal, build_schema};
use crate::services::guard::{access_guard_middleware, normalize_credential};
use crate::services::{AccessGuard, AuthConfig, AuthService, EventPublisher, SubscriptionFanout};

/// Shared state for HTTP handlers (GraphQL, health routes).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
    pub schema: CourtsideSchema,
    pub guard: AccessGuard,
    pub shutdown: ShutdownSignal,
}

impl AppState {
    /// Wire the credential service, guard, publisher and fan-out around an open
    /// database and transport
    pub fn new(
        config: Arc<Config>,
        db: Database,
        transport: Arc<dyn Transport>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let auth = AuthService::new(db.clone(), AuthConfig::from_config(&config));
        let guard = AccessGuard::new(auth.clone());
        let events = EventPublisher::new(transport.clone());
        let fanout = SubscriptionFanout::new(transport, config.subscriber_buffer);

        let schema = build_schema(db.clone(), auth, events, fanout, shutdown.clone());

        Self {
            config,
            db,
            schema,
            guard,
            shutdown,
        }
    }
}

/// Build the full Axum router: /graphql, /graphql/ws, health routes and layers.
pub fn build_app(state: AppState) -> Router<()> {
    let graphql = Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .route("/graphql/ws", get(graphql_ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.guard.clone(),
            access_guard_middleware,
        ));

    Router::new()
        .merge(crate::api::health::router())
        .merge(graphql)
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

/// GraphQL query/mutation handler; the guard middleware has already resolved the identity
async fn graphql_handler(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let request = req.into_inner().data(context);
    state.schema.execute(request).await.into()
}

/// GraphiQL interactive playground (only for browsers)
async fn graphiql(headers: HeaderMap) -> impl IntoResponse {
    let accepts_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false);

    if accepts_html {
        axum::response::Html(
            GraphiQLSource::build()
                .endpoint("/graphql")
                .subscription_endpoint("/graphql/ws")
                .finish(),
        )
        .into_response()
    } else {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(serde_json::json!({
                "error": "GET requests are not supported for GraphQL queries. Use POST with Content-Type: application/json"
            })),
        )
            .into_response()
    }
}

/// GraphQL WebSocket handler for subscriptions.
///
/// Browsers cannot set headers on a WebSocket upgrade, so a credential in the
/// `connection_init` payload takes precedence over the upgrade request's identity.
async fn graphql_ws_handler(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    protocol: GraphQLProtocol,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let guard = state.guard.clone();

    ws.protocols(["graphql-transport-ws", "graphql-ws"])
        .on_upgrade(move |socket| {
            GraphQLWebSocket::new(socket, state.schema.clone(), protocol)
                .on_connection_init(move |params| connection_init(guard, context, params))
                .serve()
        })
}

async fn connection_init(
    guard: AccessGuard,
    upgrade_context: RequestContext,
    params: serde_json::Value,
) -> async_graphql::Result<Data> {
    let context = init_context(&guard, upgrade_context, &params)
        .await
        .map_err(|e| {
            tracing::info!(error = %e, "WebSocket connection rejected by access guard");
            e.extend()
        })?;

    let mut data = Data::default();
    data.insert(context);
    Ok(data)
}

/// Identity for a WebSocket connection: a credential in the `connection_init`
/// payload replaces the one resolved from the upgrade request
pub(crate) async fn init_context(
    guard: &AccessGuard,
    upgrade_context: RequestContext,
    params: &serde_json::Value,
) -> Result<RequestContext, AuthError> {
    let credential = params
        .get("Authorization")
        .or_else(|| params.get("authorization"))
        .and_then(|v| v.as_str())
        .and_then(normalize_credential);

    match credential {
        Some(credential) => guard.authenticate(Some(&credential)).await,
        None => Ok(upgrade_context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::AuthUser;
    use assert_matches::assert_matches;
    use serde_json::json;

    async fn guard_with_user(username: &str) -> (AccessGuard, String) {
        let db = Database::in_memory().await.unwrap();
        let auth = AuthService::new(db, AuthConfig::new("ws-secret").with_bcrypt_cost(4));
        let token = auth.register(username, "pw").await.unwrap().token;
        (AccessGuard::new(auth), token)
    }

    fn upgrade_identity() -> RequestContext {
        RequestContext::authorized(AuthUser {
            user_id: "upgrade-id".to_string(),
            username: "from-upgrade".to_string(),
        })
    }

    #[tokio::test]
    async fn test_invalid_init_token_rejects_connection() {
        let (guard, _) = guard_with_user("alice").await;

        let result = init_context(
            &guard,
            upgrade_identity(),
            &json!({ "Authorization": "Bearer not-a-token" }),
        )
        .await;
        assert_matches!(result, Err(AuthError::InvalidToken));

        let params = json!({ "authorization": "garbage" });
        assert!(connection_init(guard, RequestContext::anonymous(), params).await.is_err());
    }

    #[tokio::test]
    async fn test_init_token_overrides_upgrade_identity() {
        let (guard, token) = guard_with_user("alice").await;

        for params in [
            json!({ "Authorization": format!("Bearer {token}") }),
            json!({ "authorization": token.clone() }),
        ] {
            let context = init_context(&guard, upgrade_identity(), &params)
                .await
                .unwrap();
            assert_eq!(
                context.identity.map(|user| user.username).as_deref(),
                Some("alice")
            );
        }
    }

    #[tokio::test]
    async fn test_missing_init_token_keeps_upgrade_identity() {
        let (guard, _) = guard_with_user("alice").await;

        for params in [
            json!({}),
            json!(null),
            json!({ "Authorization": "" }),
            json!({ "Authorization": 42 }),
        ] {
            let context = init_context(&guard, upgrade_identity(), &params)
                .await
                .unwrap();
            assert_eq!(context.identity, upgrade_identity().identity);
        }

        let anonymous = init_context(&guard, RequestContext::anonymous(), &json!({}))
            .await
            .unwrap();
        assert!(!anonymous.is_authenticated());
    }
}
