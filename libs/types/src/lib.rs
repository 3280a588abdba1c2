//! # Switchyard Core Types
//!
//! Shared vocabulary of the in-process router: worker and message
//! identities, the execution-context marker, the path-addressable payload
//! container, the [`Message`] envelope and the open command/reply type
//! protocol.
//!
//! ## Layout
//!
//! - [`ids`]: worker, message and execution-context identifiers
//! - [`payload`]: nested key-path container (`a:b:0:c` addressing)
//! - [`message`]: the addressed envelope and its routing flags
//! - [`protocol`]: open type registry, commands, replies, callbacks
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use types::protocol::{CommandRequestPayload, ReplyPayload};
//! use types::{Message, Payload};
//!
//! let mut request = Message::new(None);
//! request.set_command(Arc::new(CommandRequestPayload::default()));
//!
//! let mut data = Payload::new();
//! data.set("value", 42).unwrap();
//! let reply = Arc::new(ReplyPayload::success(data));
//! assert!(request.command().unwrap().reply_ok(reply.as_ref()));
//! ```

pub mod error;
pub mod ids;
pub mod message;
pub mod payload;
pub mod protocol;

pub use error::{PathError, ProtocolError};
pub use ids::{ContextId, MessageId, NameResolver, WorkerId};
pub use message::{Message, MessageFlags};
pub use payload::Payload;
pub use protocol::{
    AttachedCommand, Command, CommandCallback, CommandType, Reply, ReplyType, TypeTag,
};
