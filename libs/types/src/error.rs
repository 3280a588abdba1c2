//! Error types shared by the message and protocol layers.

use crate::ids::WorkerId;
use crate::protocol::TypeTag;

/// Failures of the command/reply protocol and message addressing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("user type space exhausted while registering {type_name} (limit {limit})")]
    TagSpaceExhausted { type_name: &'static str, limit: u32 },

    #[error("a {pack} may not contain another pack")]
    NestedPack { pack: &'static str },

    #[error("unknown receiver `{0}`")]
    UnknownReceiver(String),

    #[error("callback owned by {owner} was invoked from a foreign execution context")]
    ForeignContext { owner: WorkerId },

    #[error("callback owned by {owner} was already consumed")]
    CallbackConsumed { owner: WorkerId },

    #[error("message {msg_id} is flagged {flag} but carries no {flag} object")]
    MissingServiceObject { msg_id: u64, flag: &'static str },

    #[error("unexpected type {actual} (wanted {wanted})")]
    UnexpectedType { wanted: TypeTag, actual: TypeTag },
}

impl ProtocolError {
    pub fn missing_command(msg_id: u64) -> Self {
        Self::MissingServiceObject { msg_id, flag: "command" }
    }

    pub fn missing_reply(msg_id: u64) -> Self {
        Self::MissingServiceObject { msg_id, flag: "reply" }
    }
}

/// Failures of payload path addressing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path")]
    Empty,

    #[error("segment `{segment}` of `{path}` crosses a scalar value")]
    NotAContainer { path: String, segment: String },

    #[error("segment `{segment}` of `{path}` is not a valid array index")]
    BadIndex { path: String, segment: String },

    #[error("index {index} of `{path}` is out of range (len {len})")]
    IndexOutOfRange { path: String, index: usize, len: usize },
}
