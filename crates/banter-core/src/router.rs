//! Broadcast routing for the Banter hub.
//!
//! The router owns no persistent state: at fan-out time it copies the live
//! outbox list from the [`Registry`] (and, for presence pushes, a snapshot
//! from the [`PresenceStore`]) and then dispatches with no hub lock held.
//! Dispatch is an enqueue onto each connection's unbounded outbox; the
//! socket write happens on that connection's own writer task, so one slow
//! or dead recipient never delays the rest. A send onto a closed outbox is
//! dropped silently - delivery is best-effort and never surfaced to the
//! sender.

use std::sync::{Arc, Mutex};

use banter_protocol::ServerEvent;
use tracing::trace;

use crate::connection::{ConnectionId, Outbox};
use crate::presence::PresenceStore;
use crate::registry::Registry;

/// Fans hub events out to the right subset of live connections.
pub struct Router {
    registry: Arc<Registry>,
    presence: Arc<PresenceStore>,
    /// Serializes presence fan-out: snapshot and enqueue happen under this
    /// guard, so two racing presence changes reach every recipient in
    /// store-application order. Never held across socket I/O.
    presence_gate: Mutex<()>,
}

impl Router {
    /// Create a router over the given registry and presence store.
    #[must_use]
    pub fn new(registry: Arc<Registry>, presence: Arc<PresenceStore>) -> Self {
        Self {
            registry,
            presence,
            presence_gate: Mutex::new(()),
        }
    }

    /// Deliver a chat message to every connection, the sender included.
    ///
    /// Self-inclusive on purpose: the sender's UI renders its own message
    /// from the echo, the same path as everyone else's messages.
    pub fn broadcast_message(&self, sender: &str, payload: &str) -> usize {
        let event = Arc::new(ServerEvent::message(sender, payload));
        let count = self.deliver_all(&event);
        trace!(user = %sender, recipients = count, "Routed chat message");
        count
    }

    /// Deliver a typing notification to everyone but the originating socket.
    pub fn broadcast_typing(&self, origin: &ConnectionId, sender: &str) -> usize {
        self.deliver_others(origin, &Arc::new(ServerEvent::typing(sender)))
    }

    /// Deliver a stop-typing notification to everyone but the origin.
    pub fn broadcast_stop_typing(&self, origin: &ConnectionId, sender: &str) -> usize {
        self.deliver_others(origin, &Arc::new(ServerEvent::stop_typing(sender)))
    }

    /// Push a fresh presence snapshot to every connection.
    pub fn broadcast_presence(&self) -> usize {
        let gate = self.presence_gate.lock().unwrap();
        let event = Arc::new(ServerEvent::presence(self.presence.snapshot()));
        let count = self.deliver_all(&event);
        drop(gate);
        trace!(recipients = count, "Routed presence snapshot");
        count
    }

    fn deliver_all(&self, event: &Arc<ServerEvent>) -> usize {
        Self::dispatch(self.registry.outboxes(), event)
    }

    fn deliver_others(&self, origin: &ConnectionId, event: &Arc<ServerEvent>) -> usize {
        let mut recipients = self.registry.outboxes();
        recipients.retain(|(id, _)| id != origin);
        Self::dispatch(recipients, event)
    }

    /// Enqueue an event onto each outbox, counting successful deliveries.
    fn dispatch(recipients: Vec<(ConnectionId, Outbox)>, event: &Arc<ServerEvent>) -> usize {
        let mut delivered = 0;
        for (id, outbox) in recipients {
            if outbox.send(Arc::clone(event)).is_ok() {
                delivered += 1;
            } else {
                // Connection is tearing down; the registry will catch up.
                trace!(connection = %id, "Dropped delivery to closed outbox");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn setup() -> (Arc<Registry>, Arc<PresenceStore>, Router) {
        let registry = Arc::new(Registry::new());
        let presence = Arc::new(PresenceStore::new());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&presence));
        (registry, presence, router)
    }

    fn connect(registry: &Registry, id: &str) -> UnboundedReceiver<Arc<ServerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.on_connect(ConnectionId::new(id), tx);
        rx
    }

    #[test]
    fn test_message_is_self_inclusive() {
        let (registry, _presence, router) = setup();
        let mut rx1 = connect(&registry, "c1");
        let mut rx2 = connect(&registry, "c2");

        let count = router.broadcast_message("alice", "hi all");
        assert_eq!(count, 2);

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap().as_ref() {
                ServerEvent::Message { sender, payload } => {
                    assert_eq!(sender, "alice");
                    assert_eq!(payload, "hi all");
                }
                other => panic!("Expected message event, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_typing_is_self_exclusive() {
        let (registry, _presence, router) = setup();
        let mut rx1 = connect(&registry, "c1");
        let mut rx2 = connect(&registry, "c2");

        let count = router.broadcast_typing(&ConnectionId::new("c1"), "alice");
        assert_eq!(count, 1);

        assert!(rx1.try_recv().is_err());
        assert!(matches!(
            rx2.try_recv().unwrap().as_ref(),
            ServerEvent::Typing { sender } if sender == "alice"
        ));

        router.broadcast_stop_typing(&ConnectionId::new("c2"), "bob");
        assert!(matches!(
            rx1.try_recv().unwrap().as_ref(),
            ServerEvent::StopTyping { sender } if sender == "bob"
        ));
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_presence_snapshot_fanout() {
        let (registry, presence, router) = setup();
        let mut rx = connect(&registry, "c1");

        presence.set_online("Bob", ConnectionId::new("c1"));
        presence.set_online("alice", ConnectionId::new("c2"));
        presence.set_offline(&ConnectionId::new("c2"));

        router.broadcast_presence();
        match rx.try_recv().unwrap().as_ref() {
            ServerEvent::Presence { users } => {
                let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
                assert_eq!(names, vec!["Bob", "alice"]);
                assert!(users[0].is_online);
                assert!(!users[1].is_online);
            }
            other => panic!("Expected presence event, got {other:?}"),
        }
    }

    #[test]
    fn test_closed_outbox_does_not_block_others() {
        let (registry, _presence, router) = setup();
        let rx1 = connect(&registry, "c1");
        let mut rx2 = connect(&registry, "c2");

        // c1's receiving half is gone, as if its session task died.
        drop(rx1);

        let count = router.broadcast_message("alice", "still here?");
        assert_eq!(count, 1);
        assert!(rx2.try_recv().is_ok());
    }
}
