//! # banter-protocol
//!
//! Wire event definitions for the Banter chat hub.
//!
//! This crate defines the JSON text frames exchanged between chat clients
//! and the hub, mirroring the hub's exposed operations:
//!
//! - `ClientFrame` - Requests a client sends (register, message, typing)
//! - `ServerEvent` - Events the hub pushes (messages, typing, presence)
//!
//! ## Payload conventions
//!
//! Message payloads are opaque to the hub. By client convention a payload
//! may start with an `[image]` or `[file]` tag followed by an upload URL;
//! renderers interpret the tag, the hub never does.
//!
//! ## Example
//!
//! ```rust
//! use banter_protocol::{codec, ClientFrame};
//!
//! let frame = codec::decode(r#"{"type":"register","username":"alice"}"#).unwrap();
//! assert!(matches!(frame, ClientFrame::Register { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, ProtocolError};
pub use events::{ClientFrame, PresenceUpdate, ServerEvent};
