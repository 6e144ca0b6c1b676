use axum::{middleware, routing::get, routing::post, Json, Router};

use crate::auth::middleware::enforce_origin;
use crate::delivery::routes as delivery_routes;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Plain-text banner served at `/`.
pub const SERVICE_BANNER: &str = "relay server";

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = state.origins.cors_layer();

    let api_routes = Router::new()
        .route("/api/ping", get(ping))
        .route("/api/send_events", post(delivery_routes::send_events));

    // WebSocket endpoint; origin is checked by the same middleware as the API
    let ws_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    Router::new()
        .route("/", get(banner))
        .merge(api_routes)
        .merge(ws_routes)
        .layer(middleware::from_fn_with_state(state.clone(), enforce_origin))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn banner() -> &'static str {
    SERVICE_BANNER
}
