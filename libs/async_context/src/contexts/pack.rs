//! Sequential execution of a command pack
//!
//! Sub-command `i + 1` is dispatched only once the reply to sub-command
//! `i` has been recorded, always under the pack's own handle. When every
//! command has been answered, the collected replies go back to the
//! requester as one [`ReplyPack`].

use std::sync::Arc;

use tracing::{debug, warn};
use types::protocol::{Command, CommandPack, Reply, ReplyPack};
use types::Message;

use crate::context::{Context, ContextBase, ContextOwner};
use crate::error::ContextError;
use crate::handle::Handle;

#[derive(Debug, Clone)]
pub struct PackContext {
    base: ContextBase,
    commands: Vec<Arc<dyn Command>>,
    replies: Vec<Arc<dyn Reply>>,
}

impl PackContext {
    /// The request must carry a [`CommandPack`].
    pub fn new(handle: Handle, request: Message) -> Result<Self, ContextError> {
        let commands = request
            .command()
            .and_then(|command| command.downcast_ref::<CommandPack>())
            .map(|pack| pack.commands().to_vec())
            .ok_or(ContextError::NotAPack { msg_id: request.id().get() })?;
        Ok(Self {
            base: ContextBase::new(handle, request),
            commands,
            replies: Vec::new(),
        })
    }

    /// Dispatch the first command; an empty pack is answered at once.
    pub fn start(&mut self, owner: &mut dyn ContextOwner) -> Result<(), ContextError> {
        self.advance(owner)
    }

    pub fn size(&self) -> usize {
        self.commands.len()
    }

    /// Index of the command currently in flight.
    pub fn position(&self) -> usize {
        self.replies.len()
    }

    pub fn replies(&self) -> &[Arc<dyn Reply>] {
        &self.replies
    }

    fn advance(&mut self, owner: &mut dyn ContextOwner) -> Result<(), ContextError> {
        let position = self.replies.len();
        if position >= self.commands.len() {
            return self.complete(owner);
        }
        let next = Arc::clone(&self.commands[position]);
        debug!(
            owner = owner.label(),
            handle = %self.base.handle(),
            position,
            size = self.commands.len(),
            command = next.type_name(),
            "Dispatching pack member"
        );
        // A member that cannot be dispatched ends the pack for the requester.
        if let Err(e) = owner.dispatch(&next, self.base.handle()) {
            if let Err(reply_err) = self.base.fail(owner, &e.to_string()) {
                warn!(handle = %self.base.handle(), error = %reply_err, "Pack failure reply not sent");
            }
            return Err(e);
        }
        Ok(())
    }

    fn complete(&mut self, owner: &mut dyn ContextOwner) -> Result<(), ContextError> {
        let pack = match ReplyPack::new(self.replies.clone()) {
            Ok(pack) => pack,
            Err(e) => return self.base.fail(owner, &e.to_string()),
        };
        self.base.finish();
        let msg = owner.prepare_reply(self.base.request(), Arc::new(pack));
        owner.send(msg)
    }
}

impl Context for PackContext {
    fn base(&self) -> &ContextBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        &mut self.base
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        if self.base.is_done() {
            warn!(owner = owner.label(), handle = %self.base.handle(), "Reply for a finished pack ignored");
            return Ok(());
        }
        self.replies.push(reply);
        self.advance(owner)
    }
}
