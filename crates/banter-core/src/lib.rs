//! # banter-core
//!
//! The Banter chat hub: presence tracking, connection registry, broadcast
//! routing, and upload coordination.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - Live connections and their identity bindings
//! - **PresenceStore** - Who is online, the single source of truth
//! - **Router** - Fan-out of chat, typing, and presence events
//! - **ChatHub** - Facade tying the hub operations together
//! - **UploadCoordinator** - Out-of-band binary payload handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│   ChatHub   │────▶│   Router    │──▶ outboxes
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │        │
//!                        ▼        ▼
//!                 ┌──────────┐ ┌───────────────┐
//!                 │ Registry │ │ PresenceStore │
//!                 └──────────┘ └───────────────┘
//! ```
//!
//! The transport layer (see `banter-server`) owns the sockets; the hub only
//! ever touches per-connection outbox channels, so no hub lock is ever held
//! across socket I/O.

pub mod connection;
pub mod hub;
pub mod presence;
pub mod registry;
pub mod router;
pub mod upload;

pub use connection::{ConnectionId, Outbox};
pub use hub::{ChatHub, HubError};
pub use presence::PresenceStore;
pub use registry::Registry;
pub use router::Router;
pub use upload::{ByteStream, ObjectStore, UploadArtifact, UploadCoordinator, UploadError};
