//! Match server: HTTP API, match and evaluation WebSockets, and the
//! coordinators that own each live match.

pub mod archive;
pub mod bots;
pub mod config;
pub mod controller;
pub mod error;
pub mod eval_hub;
pub mod negotiation;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod session;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};

use config::Config;
use registry::Registry;

pub fn app(registry: Registry) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        // Matches
        .route("/api/matches", post(routes::matches::create_match))
        .route("/api/matches/{match_id}", get(routes::matches::get_match))
        .route("/api/matches/{match_id}/join", post(routes::matches::join_match))
        .route("/api/matches/{match_id}/abort", post(routes::matches::abort_match))
        .route("/api/replays/{match_id}", get(routes::matches::get_replay))
        // WebSockets
        .route("/ws/matches/{match_id}", get(routes::game_ws::ws_handler))
        .route("/ws/eval", get(routes::eval_ws::ws_handler))
        .layer(Extension(registry))
        .layer(cors)
}

/// Serves the app on a bound listener until the process stops.
pub async fn serve(listener: tokio::net::TcpListener, config: Config) -> std::io::Result<()> {
    axum::serve(listener, app(Registry::new(config))).await
}
