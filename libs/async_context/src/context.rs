//! Context and owner contracts
//!
//! A context is the correlation state of one in-flight exchange. It never
//! holds a reference to its worker: every operation that has to reply or
//! dispatch receives the owner as a [`ContextOwner`] argument, so a late
//! completion only needs the handle to find its way back.

use std::sync::Arc;

use tracing::error;
use types::protocol::{Command, Reply, ReplyFail};
use types::Message;

use crate::error::ContextError;
use crate::handle::Handle;

/// What a context needs from the worker that owns it
pub trait ContextOwner {
    fn label(&self) -> &str;

    /// Fresh message addressed to the owner's consumers.
    fn prepare_msg(&self) -> Message;

    fn prepare_reply(&self, request: &Message, reply: Arc<dyn Reply>) -> Message;

    fn send(&mut self, msg: Message) -> Result<(), ContextError>;

    /// Start `command` on behalf of the context behind `handle`.
    fn dispatch(&mut self, command: &Arc<dyn Command>, handle: Handle) -> Result<(), ContextError> {
        let _ = handle;
        Err(ContextError::NoDispatcher {
            owner: self.label().to_string(),
            command: command.type_name(),
        })
    }
}

/// An owner with a dispatcher bolted on
pub struct WithDispatch<'a, O: ?Sized, F> {
    owner: &'a mut O,
    dispatch: F,
}

impl<'a, O, F> WithDispatch<'a, O, F>
where
    O: ContextOwner + ?Sized,
    F: FnMut(&mut O, &Arc<dyn Command>, Handle) -> Result<(), ContextError>,
{
    pub fn new(owner: &'a mut O, dispatch: F) -> Self {
        Self { owner, dispatch }
    }
}

impl<O, F> ContextOwner for WithDispatch<'_, O, F>
where
    O: ContextOwner + ?Sized,
    F: FnMut(&mut O, &Arc<dyn Command>, Handle) -> Result<(), ContextError>,
{
    fn label(&self) -> &str {
        self.owner.label()
    }

    fn prepare_msg(&self) -> Message {
        self.owner.prepare_msg()
    }

    fn prepare_reply(&self, request: &Message, reply: Arc<dyn Reply>) -> Message {
        self.owner.prepare_reply(request, reply)
    }

    fn send(&mut self, msg: Message) -> Result<(), ContextError> {
        self.owner.send(msg)
    }

    fn dispatch(&mut self, command: &Arc<dyn Command>, handle: Handle) -> Result<(), ContextError> {
        (self.dispatch)(&mut *self.owner, command, handle)
    }
}

/// State shared by every context variant
#[derive(Debug, Clone)]
pub struct ContextBase {
    handle: Handle,
    done: bool,
    request: Message,
}

impl ContextBase {
    pub fn new(handle: Handle, request: Message) -> Self {
        Self { handle, done: false, request }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn request(&self) -> &Message {
        &self.request
    }

    pub fn finish(&mut self) {
        self.done = true;
    }

    /// Answer the request with a [`ReplyFail`] and finish.
    ///
    /// An empty reason becomes "Not Given".
    pub fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        let reason = if reason.is_empty() { "Not Given" } else { reason };
        error!(
            owner = owner.label(),
            handle = %self.handle,
            request = %self.request.id(),
            reason,
            "Context failed"
        );
        self.done = true;
        let msg = owner.prepare_reply(&self.request, Arc::new(ReplyFail::new(reason)));
        owner.send(msg)
    }
}

pub trait Context: Send {
    fn base(&self) -> &ContextBase;

    fn base_mut(&mut self) -> &mut ContextBase;

    /// Feed the reply of the operation this context waits for.
    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError>;

    fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        self.base_mut().fail(owner, reason)
    }

    fn handle(&self) -> Handle {
        self.base().handle()
    }

    fn is_done(&self) -> bool {
        self.base().is_done()
    }

    fn request(&self) -> &Message {
        self.base().request()
    }
}

impl Context for Box<dyn Context> {
    fn base(&self) -> &ContextBase {
        (**self).base()
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        (**self).base_mut()
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        (**self).reply(owner, reply)
    }

    fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        (**self).fail(owner, reason)
    }
}
