use std::sync::Arc;

use tracing::debug;
use types::protocol::Reply;
use types::Message;

use crate::context::{Context, ContextBase, ContextOwner};
use crate::error::ContextError;
use crate::handle::Handle;

/// Relays the single reply it receives back to the requester.
#[derive(Debug, Clone)]
pub struct SimpleContext {
    base: ContextBase,
}

impl SimpleContext {
    pub fn new(handle: Handle, request: Message) -> Self {
        Self { base: ContextBase::new(handle, request) }
    }
}

impl Context for SimpleContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        &mut self.base
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        self.base.finish();
        let msg = owner.prepare_reply(self.base.request(), reply);
        owner.send(msg)
    }
}

/// Swallows its reply; used for requests nobody waits on.
#[derive(Debug, Clone)]
pub struct NoReplyContext {
    base: ContextBase,
}

impl NoReplyContext {
    pub fn new(handle: Handle, request: Message) -> Self {
        Self { base: ContextBase::new(handle, request) }
    }
}

impl Context for NoReplyContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        &mut self.base
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        debug!(
            owner = owner.label(),
            handle = %self.base.handle(),
            reply = reply.type_name(),
            ok = reply.ok(),
            "Reply discarded"
        );
        self.base.finish();
        Ok(())
    }

    fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        debug!(owner = owner.label(), handle = %self.base.handle(), reason, "Unanswered request failed");
        self.base.finish();
        Ok(())
    }
}
