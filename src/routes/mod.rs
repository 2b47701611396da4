mod health;
mod relay;
mod session;
mod throws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The control API: what a control surface uses to fire throws and manage
/// the relay and the avatar session.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/throws", post(throws::create_throw))
        .route("/relay", get(relay::get_relay).put(relay::update_relay))
        .route("/session", get(session::get_session))
        .route("/session/connect", post(session::connect))
        .route("/session/disconnect", post(session::disconnect))
}
