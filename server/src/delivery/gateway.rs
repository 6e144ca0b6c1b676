//! Delivery gateway: pushes one event to the connection registered for a
//! user id.
//!
//! Delivery is fire-and-forget. `Delivered` means the frame was queued on
//! the connection's writer, not that the client received it. A push that
//! finds the writer already gone still reports `Delivered`, and the stale
//! registration is evicted so later pushes get `UserNotConnected`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::ws::protocol::{Frame, EVENTS_CHANNEL};
use crate::ws::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("UserId and event are required")]
    InvalidRequest,
    #[error("User not connected")]
    UserNotConnected,
}

impl DeliveryError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::UserNotConnected => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "message": self.to_string() })),
        )
            .into_response()
    }
}

/// Push `event` to the connection registered as `user_id`.
///
/// Validation happens before the registry is consulted: a missing or empty
/// user id, or a missing or `null` event, is an `InvalidRequest`.
pub fn deliver(
    registry: &ConnectionRegistry,
    user_id: Option<&str>,
    event: Option<Value>,
) -> Result<Delivered, DeliveryError> {
    let user_id = user_id
        .filter(|id| !id.is_empty())
        .ok_or(DeliveryError::InvalidRequest)?;
    let event = event
        .filter(|e| !e.is_null())
        .ok_or(DeliveryError::InvalidRequest)?;

    let Some(handle) = registry.lookup(user_id) else {
        tracing::debug!(user_id = %user_id, "Delivery target not connected");
        return Err(DeliveryError::UserNotConnected);
    };

    if handle.send(Frame::new(EVENTS_CHANNEL, event).to_message()) {
        tracing::info!(
            user_id = %user_id,
            connection_id = %handle.id(),
            "Event sent"
        );
    } else if registry.evict(user_id, &handle) {
        tracing::info!(
            user_id = %user_id,
            connection_id = %handle.id(),
            "Evicted stale connection after failed push"
        );
    }

    Ok(Delivered)
}
