//! Connection identity and the per-connection send primitive.

use std::fmt;
use std::sync::Arc;

use banter_protocol::ServerEvent;
use tokio::sync::mpsc;

/// The per-connection send primitive handed to the hub at `on_connect`.
///
/// The transport layer drains the receiving half onto the socket from the
/// connection's own writer task, so enqueueing here never blocks on a slow
/// recipient. Events are shared via `Arc` to keep fan-out copy-free.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Unique identifier for a live connection.
///
/// Assigned by the transport layer per socket; unique only within the
/// lifetime of this process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
