//! Named-event framing over WebSocket text frames.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ws::registry::{ConnectionHandle, ConnectionRegistry};

/// Event name used for payloads pushed by the delivery gateway.
pub const EVENTS_CHANNEL: &str = "events";

/// Event name used to report a malformed inbound frame.
pub const ERROR_CHANNEL: &str = "error";

/// Outbound/inbound wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize into a WebSocket text message.
    pub fn to_message(&self) -> Message {
        // A Frame is a String plus a serde_json::Value, which always serializes.
        let text = serde_json::to_string(self).unwrap_or_default();
        Message::Text(text.into())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegisterPayload {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// Client → server events.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Register(RegisterPayload),
    Message(Value),
    Unknown(String),
}

/// Parse a text frame into a client event.
pub fn parse_client_event(text: &str) -> Result<ClientEvent, serde_json::Error> {
    let frame: Frame = serde_json::from_str(text)?;
    let event = match frame.event.as_str() {
        "register" => {
            let payload = if frame.data.is_null() {
                RegisterPayload::default()
            } else {
                serde_json::from_value(frame.data)?
            };
            ClientEvent::Register(payload)
        }
        "message" => ClientEvent::Message(frame.data),
        _ => ClientEvent::Unknown(frame.event),
    };
    Ok(event)
}

/// Handle one inbound text frame for `handle`.
pub fn handle_text_message(text: &str, handle: &ConnectionHandle, registry: &ConnectionRegistry) {
    let event = match parse_client_event(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                connection_id = %handle.id(),
                error = %e,
                "Failed to decode event frame"
            );
            send_error(handle, "Invalid event frame");
            return;
        }
    };

    match event {
        ClientEvent::Register(RegisterPayload { user_id }) => match user_id {
            Some(user_id) if !user_id.is_empty() => {
                registry.register(&user_id, handle);
                tracing::info!(
                    user_id = %user_id,
                    connection_id = %handle.id(),
                    "User registered"
                );
            }
            _ => {
                tracing::debug!(
                    connection_id = %handle.id(),
                    "Register event without userId ignored"
                );
            }
        },
        ClientEvent::Message(data) => {
            tracing::debug!(
                connection_id = %handle.id(),
                data = %data,
                "Received message event"
            );
        }
        ClientEvent::Unknown(name) => {
            tracing::debug!(
                connection_id = %handle.id(),
                event = %name,
                "Ignoring unknown event"
            );
        }
    }
}

fn send_error(handle: &ConnectionHandle, message: &str) {
    let frame = Frame::new(ERROR_CHANNEL, serde_json::json!({ "message": message }));
    handle.send(frame.to_message());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn test_parse_register() {
        let event = parse_client_event(r#"{"event":"register","data":{"userId":"alice"}}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Register(RegisterPayload {
                user_id: Some("alice".to_string())
            })
        );
    }

    #[test]
    fn test_parse_register_without_data() {
        let event = parse_client_event(r#"{"event":"register"}"#).unwrap();
        assert_eq!(event, ClientEvent::Register(RegisterPayload::default()));
    }

    #[test]
    fn test_parse_message_keeps_payload() {
        let event = parse_client_event(r#"{"event":"message","data":[1,"two"]}"#).unwrap();
        assert_eq!(event, ClientEvent::Message(serde_json::json!([1, "two"])));
    }

    #[test]
    fn test_parse_unknown_event() {
        let event = parse_client_event(r#"{"event":"typing","data":{}}"#).unwrap();
        assert_eq!(event, ClientEvent::Unknown("typing".to_string()));
    }

    #[test]
    fn test_parse_rejects_non_frame() {
        assert!(parse_client_event("not json").is_err());
        assert!(parse_client_event(r#"{"data":{"userId":"alice"}}"#).is_err());
        assert!(parse_client_event(r#"{"event":"register","data":{"userId":7}}"#).is_err());
    }

    #[test]
    fn test_register_frame_binds_connection() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        handle_text_message(r#"{"event":"register","data":{"userId":"alice"}}"#, &conn, &registry);

        assert_eq!(registry.lookup("alice"), Some(conn));
    }

    #[test]
    fn test_register_with_empty_user_id_is_ignored() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        handle_text_message(r#"{"event":"register","data":{"userId":""}}"#, &conn, &registry);
        handle_text_message(r#"{"event":"register","data":{}}"#, &conn, &registry);

        assert!(registry.is_empty());
    }

    #[test]
    fn test_message_event_is_discarded() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = handle();

        handle_text_message(r#"{"event":"message","data":"hello"}"#, &conn, &registry);

        assert!(registry.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_frame_gets_error_reply() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = handle();

        handle_text_message("{oops", &conn, &registry);

        let Ok(Message::Text(text)) = rx.try_recv() else {
            panic!("expected an error frame");
        };
        let frame: Frame = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(frame.event, ERROR_CHANNEL);
        assert_eq!(frame.data["message"], "Invalid event frame");
        assert!(registry.is_empty());
    }
}
