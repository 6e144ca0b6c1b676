use async_trait::async_trait;
use axum::http::HeaderMap;
use std::collections::HashMap;

/// What a connection presented when it asked to upgrade.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

impl Handshake {
    /// Bearer token from `?token=` or the `Authorization` header, in that order.
    pub fn bearer_token(&self) -> Option<&str> {
        if let Some(token) = self.query.get("token").filter(|t| !t.is_empty()) {
            return Some(token.as_str());
        }
        self.headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct HandshakeRejection {
    pub reason: String,
}

impl HandshakeRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Admission check run on every WebSocket upgrade before the connection
/// is handed to its actor.
///
/// ```
/// use async_trait::async_trait;
/// use relay_server::auth::handshake::{ConnectionAuthorizer, Handshake, HandshakeRejection};
///
/// struct SharedToken(String);
///
/// #[async_trait]
/// impl ConnectionAuthorizer for SharedToken {
///     async fn authorize(&self, handshake: &Handshake) -> Result<(), HandshakeRejection> {
///         match handshake.bearer_token() {
///             Some(token) if token == self.0 => Ok(()),
///             _ => Err(HandshakeRejection::new("Authentication error")),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionAuthorizer: Send + Sync {
    async fn authorize(&self, handshake: &Handshake) -> Result<(), HandshakeRejection>;
}

/// Admits every connection. No token is required or checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ConnectionAuthorizer for AllowAll {
    async fn authorize(&self, _handshake: &Handshake) -> Result<(), HandshakeRejection> {
        Ok(())
    }
}
