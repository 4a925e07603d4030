//! HTTP server for a GraphQL [`Api`].
//!
//! Routes:
//!
//! * `POST /graphql` executes a GraphQL request. Callers identify themselves with an
//!   `Authorization: Bearer <user id>` header, see [`BearerAuth`].
//! * `GET /graphql` serves GraphQL Playground, in development mode only.
//! * `GET /health` reports the state of the connection to the store, with status 200 only when
//!   the connection is open.
//!
//! Cross-origin requests are only allowed from the configured origins.

use crate::api::Api;
use crate::auth::BearerAuth;
use crate::document::Id;
use crate::store::{ConnectionState, DocumentStore};
use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// The path of the GraphQL endpoint.
pub const GRAPHQL_PATH: &str = "/graphql";

/// The environment the server runs in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Introspection and the playground are enabled.
    #[default]
    Development,
    Production,
}

/// Server configuration, from command line flags or the environment.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Serve users and articles over GraphQL")]
pub struct Config {
    /// The MongoDB connection string, including the database name.
    #[arg(
        long,
        env = "DOCGRAPH_DATABASE_URL",
        default_value = "mongodb://localhost:27017/docgraph"
    )]
    pub database_url: String,

    /// The port to listen on.
    #[arg(long, env = "DOCGRAPH_PORT", default_value_t = 4000)]
    pub port: u16,

    #[arg(long, env = "DOCGRAPH_MODE", value_enum, default_value_t = Mode::Development)]
    pub mode: Mode,

    /// Origins allowed to make cross-origin requests, comma separated.
    #[arg(
        long,
        env = "DOCGRAPH_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub cors_origins: Vec<String>,

    /// Users allowed to modify anything, comma separated.
    #[arg(long, env = "DOCGRAPH_ADMIN_IDS", value_delimiter = ',')]
    pub admin_ids: Vec<Id>,

    /// Keep all data in memory instead of connecting to MongoDB.
    #[arg(long, env = "DOCGRAPH_IN_MEMORY")]
    pub in_memory: bool,
}

impl Config {
    pub fn development(&self) -> bool {
        self.mode == Mode::Development
    }

    /// The cross-origin policy: the configured origins may send GraphQL requests.
    pub fn cors(&self) -> CorsLayer {
        let origins = self
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

#[derive(Clone)]
struct Server<S> {
    api: Api<S>,
    auth: BearerAuth,
}

/// The routes serving `api`.
pub fn router<S: DocumentStore>(api: Api<S>, auth: BearerAuth, config: &Config) -> Router {
    let mut graphql_route = post(graphql::<S>);
    if config.development() {
        graphql_route = graphql_route.get(playground);
    }
    Router::new()
        .route(GRAPHQL_PATH, graphql_route)
        .route("/health", get(health::<S>))
        .layer(config.cors())
        .layer(TraceLayer::new_for_http())
        .with_state(Server { api, auth })
}

/// Serve `api` until the process is stopped.
pub async fn serve<S: DocumentStore>(
    api: Api<S>,
    auth: BearerAuth,
    config: &Config,
) -> std::io::Result<()> {
    let app = router(api, auth, config);
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        mode = ?config.mode,
        "serving GraphQL on http://{}{GRAPHQL_PATH}",
        listener.local_addr()?
    );
    axum::serve(listener, app).await
}

async fn graphql<S: DocumentStore>(
    State(server): State<Server<S>>,
    headers: HeaderMap,
    Json(request): Json<async_graphql::Request>,
) -> Result<Json<async_graphql::Response>, StatusCode> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let identity = server
        .auth
        .identify(server.api.store(), authorization)
        .await
        .map_err(|err| {
            error!("error identifying caller: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(server.api.execute(request, identity).await))
}

async fn playground() -> Html<String> {
    Html(playground_source(GraphQLPlaygroundConfig::new(GRAPHQL_PATH)))
}

async fn health<S: DocumentStore>(State(server): State<Server<S>>) -> (StatusCode, String) {
    let state = server.api.store().state();
    let status = match state {
        ConnectionState::Open => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, state.to_string())
}
