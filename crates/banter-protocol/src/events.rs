//! Frame types for the Banter wire protocol.
//!
//! Frames are JSON text messages tagged with a `type` field. Client frames
//! carry the sender's username explicitly on every call; the hub relays the
//! name as given rather than resolving it from the connection binding.

use serde::{Deserialize, Serialize};

/// One entry of a presence listing pushed to clients.
///
/// Connection identifiers are internal to the hub and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    /// Username in its first-registered casing.
    pub username: String,
    /// Whether a live connection is currently bound to this user.
    pub is_online: bool,
}

impl PresenceUpdate {
    /// Create a new presence entry.
    #[must_use]
    pub fn new(username: impl Into<String>, is_online: bool) -> Self {
        Self {
            username: username.into(),
            is_online,
        }
    }
}

/// A frame sent by a client to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Bind this connection to a username and go online.
    #[serde(rename = "register")]
    Register {
        /// Requested username; leading/trailing whitespace is trimmed.
        username: String,
    },

    /// Send a chat message to everyone, including the sender.
    #[serde(rename = "message")]
    Message {
        /// Sender's username.
        sender: String,
        /// Opaque payload; may carry an `[image]`/`[file]` tag by convention.
        payload: String,
    },

    /// Notify everyone else that the sender started typing.
    #[serde(rename = "typing")]
    Typing {
        /// Sender's username.
        sender: String,
    },

    /// Notify everyone else that the sender stopped typing.
    #[serde(rename = "stop_typing")]
    StopTyping {
        /// Sender's username.
        sender: String,
    },
}

/// An event pushed by the hub to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chat message, delivered to every connection.
    #[serde(rename = "message")]
    Message {
        /// Sender's username.
        sender: String,
        /// Opaque payload as supplied by the sender.
        payload: String,
    },

    /// Someone started typing, delivered to everyone but the typist.
    #[serde(rename = "typing")]
    Typing {
        /// Typist's username.
        sender: String,
    },

    /// Someone stopped typing, delivered to everyone but the typist.
    #[serde(rename = "stop_typing")]
    StopTyping {
        /// Typist's username.
        sender: String,
    },

    /// Full presence listing, pushed after every register/disconnect.
    ///
    /// Entries are ordered online-first, then case-insensitive alphabetical.
    #[serde(rename = "presence")]
    Presence {
        /// All users ever registered, with current online state.
        users: Vec<PresenceUpdate>,
    },

    /// A request from this connection was rejected.
    #[serde(rename = "error")]
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl ServerEvent {
    /// Create a chat message event.
    #[must_use]
    pub fn message(sender: impl Into<String>, payload: impl Into<String>) -> Self {
        ServerEvent::Message {
            sender: sender.into(),
            payload: payload.into(),
        }
    }

    /// Create a typing event.
    #[must_use]
    pub fn typing(sender: impl Into<String>) -> Self {
        ServerEvent::Typing {
            sender: sender.into(),
        }
    }

    /// Create a stop-typing event.
    #[must_use]
    pub fn stop_typing(sender: impl Into<String>) -> Self {
        ServerEvent::StopTyping {
            sender: sender.into(),
        }
    }

    /// Create a presence listing event.
    #[must_use]
    pub fn presence(users: Vec<PresenceUpdate>) -> Self {
        ServerEvent::Presence { users }
    }

    /// Create an error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}
