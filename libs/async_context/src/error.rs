use types::ProtocolError;

use crate::handle::Handle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context handle may not be zero")]
    ZeroHandle,

    #[error("raw handle {0:#x} has a zero generation")]
    InvalidHandle(u64),

    #[error("handle {0} is already in use")]
    HandleInUse(Handle),

    #[error("handle {handle} predates generation {current} of its slot")]
    StaleHandle { handle: Handle, current: u32 },

    #[error("slot index {index} exceeds the limit of {max}")]
    OutOfRange { index: u32, max: u32 },

    #[error("no context for handle {0}")]
    NotFound(Handle),

    #[error("message {msg_id} does not carry a command pack")]
    NotAPack { msg_id: u64 },

    #[error("{owner} cannot dispatch {command}: no dispatcher installed")]
    NoDispatcher { owner: String, command: &'static str },

    #[error("send failed: {0}")]
    Send(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ContextError {
    pub fn send_failed(reason: impl ToString) -> Self {
        Self::Send(reason.to_string())
    }
}
