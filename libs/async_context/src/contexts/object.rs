use std::sync::Arc;

use tracing::warn;
use types::protocol::{Reply, ReplyPayloadOk};
use types::{Message, Payload};

use crate::context::{Context, ContextBase, ContextOwner};
use crate::error::ContextError;
use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectMode {
    /// Answer the requester: relay failures, merge successes.
    Reply,
    /// Nobody waits: drop failures, forward successes as a fresh message.
    Silent,
}

/// Turns a backend result object into the requester's response.
#[derive(Debug, Clone)]
pub struct ObjectContext {
    base: ContextBase,
    mode: ObjectMode,
}

impl ObjectContext {
    pub fn new(handle: Handle, request: Message, mode: ObjectMode) -> Self {
        Self { base: ContextBase::new(handle, request), mode }
    }

    pub fn mode(&self) -> ObjectMode {
        self.mode
    }
}

impl Context for ObjectContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        &mut self.base
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        self.base.finish();
        let result = reply.payload().cloned().unwrap_or_default();

        match (self.mode, reply.ok()) {
            (ObjectMode::Reply, false) => {
                let msg = owner.prepare_reply(self.base.request(), reply);
                owner.send(msg)
            }
            (ObjectMode::Reply, true) => {
                let mut msg = owner.prepare_reply(
                    self.base.request(),
                    Arc::new(ReplyPayloadOk::new(result.clone())),
                );
                msg.payload_mut().merge(&result, true);
                owner.send(msg)
            }
            (ObjectMode::Silent, false) => {
                warn!(
                    owner = owner.label(),
                    handle = %self.base.handle(),
                    reason = reply.reason().unwrap_or("Not Given"),
                    "Silent request failed, dropping result"
                );
                Ok(())
            }
            (ObjectMode::Silent, true) => {
                let mut msg = owner.prepare_msg();
                let mut payload: Payload = self.base.request().payload().clone();
                payload.merge(&result, true);
                msg.set_payload(payload);
                owner.send(msg)
            }
        }
    }

    fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        match self.mode {
            ObjectMode::Reply => self.base.fail(owner, reason),
            ObjectMode::Silent => {
                warn!(owner = owner.label(), handle = %self.base.handle(), reason, "Silent request failed");
                self.base.finish();
                Ok(())
            }
        }
    }
}
