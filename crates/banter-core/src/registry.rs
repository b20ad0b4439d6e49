//! Live connection registry for the Banter hub.
//!
//! The registry owns the binding table from connection to identity and holds
//! each connection's outbox. It records transport lifecycle events; presence
//! state changes themselves belong to [`crate::presence::PresenceStore`].

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::connection::{ConnectionId, Outbox};

/// Registry entry for one live socket.
#[derive(Debug)]
struct ConnectionEntry {
    /// Identity bound by `register`, if any. Cleared only by removal.
    identity: Option<String>,
    /// Send primitive for this connection.
    outbox: Outbox,
}

/// Tracks live connections and their identity bindings.
///
/// Mutations serialize on one internal mutex. The router never reaches the
/// map directly; it takes a copied list of outboxes and dispatches after the
/// lock is released.
#[derive(Debug, Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly connected, not-yet-registered socket.
    pub fn on_connect(&self, id: ConnectionId, outbox: Outbox) {
        let mut connections = self.connections.lock().unwrap();
        debug!(connection = %id, "Registry: connection opened");
        connections.insert(
            id,
            ConnectionEntry {
                identity: None,
                outbox,
            },
        );
    }

    /// Bind a connection to an identity.
    ///
    /// Returns `false` if the connection is not (or no longer) registered
    /// with the transport, in which case nothing changes.
    pub fn bind(&self, id: &ConnectionId, identity: &str) -> bool {
        let mut connections = self.connections.lock().unwrap();
        if let Some(entry) = connections.get_mut(id) {
            entry.identity = Some(identity.to_string());
            debug!(connection = %id, user = %identity, "Registry: identity bound");
            true
        } else {
            false
        }
    }

    /// Remove a disconnected socket, returning the identity that was bound.
    ///
    /// The outer `Option` is `None` for a connection the registry never knew;
    /// the inner one is `None` when the client disconnected before
    /// registering. Neither case is an error.
    pub fn remove(&self, id: &ConnectionId) -> Option<Option<String>> {
        let mut connections = self.connections.lock().unwrap();
        let entry = connections.remove(id)?;
        debug!(connection = %id, user = ?entry.identity, "Registry: connection closed");
        Some(entry.identity)
    }

    /// Identity currently bound to a connection, if any.
    #[must_use]
    pub fn identity_of(&self, id: &ConnectionId) -> Option<String> {
        let connections = self.connections.lock().unwrap();
        connections.get(id).and_then(|e| e.identity.clone())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Copy out the outboxes of all live connections.
    ///
    /// The copy decouples fan-out from the registry lock: senders are cheap
    /// clones, and delivery happens after this method returns.
    #[must_use]
    pub fn outboxes(&self) -> Vec<(ConnectionId, Outbox)> {
        let connections = self.connections.lock().unwrap();
        connections
            .iter()
            .map(|(id, entry)| (id.clone(), entry.outbox.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn outbox() -> Outbox {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[test]
    fn test_connect_bind_remove() {
        let registry = Registry::new();
        let id = ConnectionId::new("c1");

        registry.on_connect(id.clone(), outbox());
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.identity_of(&id), None);

        assert!(registry.bind(&id, "alice"));
        assert_eq!(registry.identity_of(&id), Some("alice".to_string()));

        assert_eq!(registry.remove(&id), Some(Some("alice".to_string())));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_remove_before_register() {
        let registry = Registry::new();
        let id = ConnectionId::new("c1");

        registry.on_connect(id.clone(), outbox());
        // Disconnected without ever binding an identity.
        assert_eq!(registry.remove(&id), Some(None));
        // A second removal is a no-op.
        assert_eq!(registry.remove(&id), None);
    }

    #[test]
    fn test_bind_unknown_connection() {
        let registry = Registry::new();
        assert!(!registry.bind(&ConnectionId::new("ghost"), "alice"));
    }

    #[test]
    fn test_outboxes_snapshot() {
        let registry = Registry::new();
        registry.on_connect(ConnectionId::new("c1"), outbox());
        registry.on_connect(ConnectionId::new("c2"), outbox());

        let outboxes = registry.outboxes();
        assert_eq!(outboxes.len(), 2);

        // Mutating after the copy does not affect the snapshot.
        registry.remove(&ConnectionId::new("c1"));
        assert_eq!(outboxes.len(), 2);
        assert_eq!(registry.connection_count(), 1);
    }
}
