use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::delivery::{deliver, DeliveryError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendEventRequest {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event: Option<Value>,
}

/// POST /api/send_events — push `event` to the connection registered as `userId`.
/// 200 when queued, 404 when nobody is registered under that id, 400 when a
/// field is missing or the body is not a JSON object of that shape.
pub async fn send_events(
    State(state): State<AppState>,
    body: Result<Json<SendEventRequest>, JsonRejection>,
) -> Result<Json<Value>, DeliveryError> {
    let Json(req) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected send_events body");
        DeliveryError::InvalidRequest
    })?;

    deliver(&state.connections, req.user_id.as_deref(), req.event)?;

    Ok(Json(serde_json::json!({ "message": "Event sent" })))
}
