use std::sync::Arc;

use crate::auth::handshake::{AllowAll, ConnectionAuthorizer};
use crate::auth::middleware::OriginPolicy;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Registered WebSocket connections, keyed by user id
    pub connections: ConnectionRegistry,
    /// Admission hook run on every WebSocket upgrade
    pub authorizer: Arc<dyn ConnectionAuthorizer>,
    /// Cross-origin allow-list for both HTTP and WebSocket
    pub origins: OriginPolicy,
}

impl AppState {
    /// State with an empty registry that admits every connection.
    pub fn new(origins: OriginPolicy) -> Self {
        Self {
            connections: ConnectionRegistry::new(),
            authorizer: Arc::new(AllowAll),
            origins,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn ConnectionAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }
}
