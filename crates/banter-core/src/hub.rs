//! The chat hub facade.
//!
//! [`ChatHub`] ties the registry, presence store, and router together into
//! the operation set the transport layer calls: connection lifecycle events
//! plus register, chat, and typing requests. It is the only place that
//! sequences "mutate presence, then push a snapshot".

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::connection::{ConnectionId, Outbox};
use crate::presence::PresenceStore;
use crate::registry::Registry;
use crate::router::Router;

/// Hub request errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// Registration with an empty or whitespace-only username.
    #[error("Invalid identity: username must not be empty")]
    InvalidIdentity,
}

/// The message relay and presence hub.
///
/// One instance serves the whole process; the transport layer shares it
/// across connection tasks behind an `Arc`.
pub struct ChatHub {
    registry: Arc<Registry>,
    presence: Arc<PresenceStore>,
    router: Router,
}

impl ChatHub {
    /// Create a hub with empty registry and presence state.
    #[must_use]
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());
        let presence = Arc::new(PresenceStore::new());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&presence));
        Self {
            registry,
            presence,
            router,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The presence store.
    #[must_use]
    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    /// Transport callback: a socket connected.
    ///
    /// The connection starts unbound; nothing is broadcast until it
    /// registers.
    pub fn on_connect(&self, id: ConnectionId, outbox: Outbox) {
        self.registry.on_connect(id, outbox);
    }

    /// Bind a connection to a username and announce the new presence state.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidIdentity`] for an empty or whitespace-only
    /// username; no state changes and nothing is broadcast, the connection
    /// stays unbound and may retry.
    pub fn register(&self, id: &ConnectionId, username: &str) -> Result<(), HubError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(HubError::InvalidIdentity);
        }

        if !self.registry.bind(id, username) {
            // The socket raced a disconnect; nothing to announce.
            debug!(connection = %id, "Register on unknown connection ignored");
            return Ok(());
        }

        self.presence.set_online(username, id.clone());
        info!(connection = %id, user = %username, "Registered");
        self.router.broadcast_presence();
        Ok(())
    }

    /// Relay a chat message to every connection, sender included.
    ///
    /// Returns the number of connections the message was handed to.
    pub fn send_message(&self, sender: &str, payload: &str) -> usize {
        self.router.broadcast_message(sender, payload)
    }

    /// Relay a typing notification to everyone but the origin socket.
    pub fn typing(&self, origin: &ConnectionId, sender: &str) -> usize {
        self.router.broadcast_typing(origin, sender)
    }

    /// Relay a stop-typing notification to everyone but the origin socket.
    pub fn stop_typing(&self, origin: &ConnectionId, sender: &str) -> usize {
        self.router.broadcast_stop_typing(origin, sender)
    }

    /// Transport callback: a socket disconnected.
    ///
    /// Never an error. A connection that never registered leaves no trace
    /// and triggers no broadcast. For a registered connection the bound
    /// identity goes offline (a no-op if it re-registered elsewhere in the
    /// meantime) and an updated snapshot is pushed.
    pub fn on_disconnect(&self, id: &ConnectionId) {
        match self.registry.remove(id) {
            Some(Some(identity)) => {
                self.presence.set_offline(id);
                info!(connection = %id, user = %identity, "Disconnected");
                self.router.broadcast_presence();
            }
            Some(None) => {
                debug!(connection = %id, "Unregistered connection closed");
            }
            None => {}
        }
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banter_protocol::ServerEvent;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn connect(hub: &ChatHub, id: &str) -> UnboundedReceiver<Arc<ServerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        hub.on_connect(ConnectionId::new(id), tx);
        rx
    }

    fn presence_names(rx: &mut UnboundedReceiver<Arc<ServerEvent>>) -> Vec<(String, bool)> {
        match rx.try_recv().unwrap().as_ref() {
            ServerEvent::Presence { users } => users
                .iter()
                .map(|u| (u.username.clone(), u.is_online))
                .collect(),
            other => panic!("Expected presence event, got {other:?}"),
        }
    }

    #[test]
    fn test_register_broadcasts_presence_to_all() {
        let hub = ChatHub::new();
        let mut rx1 = connect(&hub, "c1");
        let mut rx2 = connect(&hub, "c2");

        hub.register(&ConnectionId::new("c1"), "alice").unwrap();

        // Both sockets get the snapshot, the registering one included.
        assert_eq!(presence_names(&mut rx1), vec![("alice".to_string(), true)]);
        assert_eq!(presence_names(&mut rx2), vec![("alice".to_string(), true)]);
    }

    #[test]
    fn test_register_rejects_blank_usernames() {
        let hub = ChatHub::new();
        let mut rx = connect(&hub, "c1");
        let id = ConnectionId::new("c1");

        assert_eq!(hub.register(&id, ""), Err(HubError::InvalidIdentity));
        assert_eq!(hub.register(&id, "   \t"), Err(HubError::InvalidIdentity));

        // No state change, no broadcast; the connection stays unbound.
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.presence().record_count(), 0);
        assert_eq!(hub.registry().identity_of(&id), None);
    }

    #[test]
    fn test_register_trims_whitespace() {
        let hub = ChatHub::new();
        let _rx = connect(&hub, "c1");

        hub.register(&ConnectionId::new("c1"), "  alice ").unwrap();
        assert!(hub.presence().is_online("alice"));
    }

    #[test]
    fn test_disconnect_marks_offline_and_broadcasts() {
        let hub = ChatHub::new();
        let _rx1 = connect(&hub, "c1");
        let mut rx2 = connect(&hub, "c2");

        hub.register(&ConnectionId::new("c1"), "alice").unwrap();
        let _ = rx2.try_recv();

        hub.on_disconnect(&ConnectionId::new("c1"));
        assert_eq!(presence_names(&mut rx2), vec![("alice".to_string(), false)]);
        assert!(!hub.presence().is_online("alice"));
    }

    #[test]
    fn test_disconnect_before_register_is_silent() {
        let hub = ChatHub::new();
        let _rx1 = connect(&hub, "c1");
        let mut rx2 = connect(&hub, "c2");

        hub.on_disconnect(&ConnectionId::new("c1"));

        assert!(rx2.try_recv().is_err());
        assert_eq!(hub.registry().connection_count(), 1);
    }

    #[test]
    fn test_reconnect_displaces_stale_session() {
        let hub = ChatHub::new();
        let _rx1 = connect(&hub, "c1");
        let _rx2 = connect(&hub, "c2");

        hub.register(&ConnectionId::new("c1"), "alice").unwrap();
        // Same identity registers again from a new connection before the
        // first one ever disconnected.
        hub.register(&ConnectionId::new("c2"), "alice").unwrap();

        // The stale socket's disconnect must not take alice offline.
        hub.on_disconnect(&ConnectionId::new("c1"));
        assert!(hub.presence().is_online("alice"));
        assert_eq!(hub.presence().record_count(), 1);
    }

    #[test]
    fn test_message_flow_through_hub() {
        let hub = ChatHub::new();
        let mut rx1 = connect(&hub, "c1");

        assert_eq!(hub.send_message("alice", "[image]http://x/uploads/a.png"), 1);
        assert!(matches!(
            rx1.try_recv().unwrap().as_ref(),
            ServerEvent::Message { payload, .. } if payload.starts_with("[image]")
        ));

        // Typing from c1 goes to nobody else here.
        assert_eq!(hub.typing(&ConnectionId::new("c1"), "alice"), 0);
    }
}
