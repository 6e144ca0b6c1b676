//! Connection registry: maps a registered user id to the one live
//! WebSocket connection currently speaking for it.
//!
//! The last registration for a user id wins. Each connection remembers the
//! identity it registered under, so a disconnect can find its own entry
//! without scanning the map.

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender half of a connection's outbound channel. The writer task owns the
/// receiving half and forwards everything into the socket.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// Opaque, cheaply clonable handle to one live WebSocket connection.
///
/// Two handles are equal when they refer to the same connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    id: Uuid,
    sender: ConnectionSender,
    /// User id this connection last registered as.
    identity: Mutex<Option<String>>,
}

impl ConnectionHandle {
    pub fn new(sender: ConnectionSender) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::now_v7(),
                sender,
                identity: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The user id this connection is registered under, if any.
    pub fn identity(&self) -> Option<String> {
        self.slot().clone()
    }

    /// Queue a message for the writer task. Never blocks; returns false when
    /// the connection's writer has already gone away.
    pub fn send(&self, msg: Message) -> bool {
        self.inner.sender.send(msg).is_ok()
    }

    fn set_identity(&self, user_id: Option<String>) -> Option<String> {
        std::mem::replace(&mut *self.slot(), user_id)
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // The slot holds a plain Option, so a poisoned lock still holds valid data.
        self.inner
            .identity
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ConnectionHandle {}

/// Shared registry of registered connections, keyed by user id.
#[derive(Clone, Debug, Default)]
pub struct ConnectionRegistry {
    entries: Arc<DashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user_id` to `handle`, replacing whatever connection held it.
    ///
    /// An empty user id is ignored. If the handle was registered under a
    /// different user id before, that older mapping is dropped so a
    /// connection never answers to two identities.
    pub fn register(&self, user_id: &str, handle: &ConnectionHandle) {
        if user_id.is_empty() {
            return;
        }

        let previous_identity = handle.set_identity(Some(user_id.to_string()));
        if let Some(previous) = previous_identity.filter(|p| p != user_id) {
            if self
                .entries
                .remove_if(&previous, |_, current| current == handle)
                .is_some()
            {
                tracing::debug!(
                    connection_id = %handle.id(),
                    previous_user_id = %previous,
                    user_id = %user_id,
                    "Connection re-registered under a new user id"
                );
            }
        }

        if let Some(displaced) = self.entries.insert(user_id.to_string(), handle.clone()) {
            if displaced != *handle {
                tracing::debug!(
                    user_id = %user_id,
                    displaced_connection_id = %displaced.id(),
                    connection_id = %handle.id(),
                    "Registration replaced an existing connection"
                );
            }
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.entries.get(user_id).map(|entry| entry.value().clone())
    }

    /// Remove the entry owned by `handle` and return the user id it freed.
    ///
    /// Returns `None` without touching the map when the connection never
    /// registered, or when a newer connection has since taken its user id.
    pub fn remove_by_handle(&self, handle: &ConnectionHandle) -> Option<String> {
        let user_id = handle.set_identity(None)?;
        self.entries
            .remove_if(&user_id, |_, current| current == handle)
            .map(|(user_id, _)| user_id)
    }

    /// Drop `user_id`'s entry if it still points at `handle`.
    ///
    /// Used when a push finds the connection's writer already gone, before
    /// that connection's own disconnect has been processed.
    pub fn evict(&self, user_id: &str, handle: &ConnectionHandle) -> bool {
        self.entries
            .remove_if(user_id, |_, current| current == handle)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all user ids with a registered connection.
    pub fn connected_users(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn test_register_twice_keeps_latest_handle() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry.register("alice", &first);
        registry.register("alice", &second);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("alice"), Some(second));
    }

    #[test]
    fn test_lookup_unknown_user_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.lookup("nobody").is_none());
    }

    #[test]
    fn test_empty_user_id_is_ignored() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.register("", &conn);

        assert!(registry.is_empty());
        assert!(conn.identity().is_none());
    }

    #[test]
    fn test_disconnect_removes_registration() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.register("alice", &conn);
        let freed = registry.remove_by_handle(&conn);

        assert_eq!(freed.as_deref(), Some("alice"));
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn test_disconnect_before_register_is_noop() {
        let registry = ConnectionRegistry::new();
        let (registered, _rx1) = handle();
        let (anonymous, _rx2) = handle();
        registry.register("bob", &registered);

        assert!(registry.remove_by_handle(&anonymous).is_none());
        assert_eq!(registry.connected_users(), vec!["bob".to_string()]);
    }

    #[test]
    fn test_displaced_connection_disconnect_keeps_successor() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();

        registry.register("alice", &old);
        registry.register("alice", &new);

        assert!(registry.remove_by_handle(&old).is_none());
        assert_eq!(registry.lookup("alice"), Some(new));
    }

    #[test]
    fn test_reregister_under_new_id_evicts_old_id() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.register("alice", &conn);
        registry.register("alice-2", &conn);

        assert!(registry.lookup("alice").is_none());
        assert_eq!(registry.lookup("alice-2"), Some(conn.clone()));
        assert_eq!(conn.identity().as_deref(), Some("alice-2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_does_not_evict_someone_elses_entry() {
        let registry = ConnectionRegistry::new();
        let (a, _rx1) = handle();
        let (b, _rx2) = handle();

        registry.register("alice", &a);
        registry.register("alice", &b);
        // `a` was displaced; moving it to a new id must not drop `b`.
        registry.register("carol", &a);

        assert_eq!(registry.lookup("alice"), Some(b));
        assert_eq!(registry.lookup("carol"), Some(a));
    }

    #[test]
    fn test_send_reports_closed_connection() {
        let (conn, rx) = handle();
        assert!(conn.send(Message::Text("hi".into())));

        drop(rx);
        assert!(!conn.send(Message::Text("hi".into())));
    }

    #[test]
    fn test_evict_only_removes_matching_handle() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();
        registry.register("alice", &old);
        registry.register("alice", &new);

        assert!(!registry.evict("alice", &old));
        assert_eq!(registry.lookup("alice"), Some(new.clone()));

        assert!(registry.evict("alice", &new));
        assert!(registry.lookup("alice").is_none());
        assert!(!registry.evict("alice", &new));
    }
}
