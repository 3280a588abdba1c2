//! Single-shot completion callbacks
//!
//! A callback is bound to the worker that issued the command and to that
//! worker's execution context. It travels with the command, comes back on
//! the reply, and may only be taken once, on the owning context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::command::Command;
use crate::error::ProtocolError;
use crate::ids::{ContextId, WorkerId};
use crate::message::Message;

/// Erased callback body: `(worker, worker context, reply message)`.
pub type CallbackFn = Box<dyn FnOnce(&mut dyn Any, &mut dyn Any, &Message) + Send>;

pub struct CommandCallback {
    owner: WorkerId,
    context: ContextId,
    on_done: Mutex<Option<CallbackFn>>,
    on_fail: Mutex<Option<CallbackFn>>,
}

impl CommandCallback {
    pub fn new(owner: WorkerId, context: ContextId, on_done: CallbackFn) -> Self {
        Self {
            owner,
            context,
            on_done: Mutex::new(Some(on_done)),
            on_fail: Mutex::new(None),
        }
    }

    pub fn with_fail(self, on_fail: CallbackFn) -> Self {
        *self.on_fail.lock() = Some(on_fail);
        self
    }

    pub fn owner(&self) -> WorkerId {
        self.owner
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_consumed(&self) -> bool {
        self.on_done.lock().is_none() && self.on_fail.lock().is_none()
    }

    /// Take the body matching the outcome and disarm the other one.
    ///
    /// Without a failure body, failed replies go to the completion body.
    /// Refused when called from any context but the owner's.
    pub fn take(&self, ok: bool) -> Result<CallbackFn, ProtocolError> {
        if !self.context.is_current() {
            warn!(
                owner = %self.owner,
                expected_context = %self.context,
                actual_context = ?ContextId::current(),
                "Refusing callback from foreign execution context"
            );
            return Err(ProtocolError::ForeignContext { owner: self.owner });
        }

        let done = self.on_done.lock().take();
        let fail = self.on_fail.lock().take();
        let chosen = if ok { done } else { fail.or(done) };
        chosen.ok_or(ProtocolError::CallbackConsumed { owner: self.owner })
    }
}

impl fmt::Debug for CommandCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandCallback")
            .field("owner", &self.owner)
            .field("context", &self.context)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

/// A command as carried by a message, with its optional callback
#[derive(Debug)]
pub struct AttachedCommand {
    command: Arc<dyn Command>,
    callback: Option<CommandCallback>,
}

impl AttachedCommand {
    pub fn new(command: Arc<dyn Command>) -> Self {
        Self { command, callback: None }
    }

    pub fn with_callback(command: Arc<dyn Command>, callback: CommandCallback) -> Self {
        Self { command, callback: Some(callback) }
    }

    pub fn command(&self) -> &Arc<dyn Command> {
        &self.command
    }

    pub fn callback(&self) -> Option<&CommandCallback> {
        self.callback.as_ref()
    }

    /// True when this command carries a callback owned by `worker`.
    pub fn is_owned_by(&self, worker: WorkerId) -> bool {
        self.callback.as_ref().is_some_and(|cb| cb.owner == worker)
    }
}
