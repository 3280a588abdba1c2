//! Context variants

mod object;
mod pack;
mod simple;

pub use object::{ObjectContext, ObjectMode};
pub use pack::PackContext;
pub use simple::{NoReplyContext, SimpleContext};

use std::sync::Arc;

use types::protocol::{CommandPack, Reply};
use types::Message;

use crate::context::{Context, ContextBase, ContextOwner};
use crate::error::ContextError;
use crate::handle::Handle;
use crate::manager::ContextManager;

/// Any of the stock contexts, for managers that mix them
#[derive(Debug, Clone)]
pub enum AnyContext {
    Simple(SimpleContext),
    Pack(PackContext),
    Object(ObjectContext),
    NoReply(NoReplyContext),
}

impl AnyContext {
    /// Pick the variant matching the request's command: packs run
    /// sequentially, commands that expect no reply get a silent context,
    /// everything else is relayed.
    pub fn for_request(handle: Handle, request: Message) -> Result<Self, ContextError> {
        let (is_pack, expects_reply) = match request.command() {
            Some(command) => (command.is::<CommandPack>(), command.expects_reply()),
            None => (false, false),
        };
        Ok(if is_pack {
            Self::Pack(PackContext::new(handle, request)?)
        } else if expects_reply {
            Self::Simple(SimpleContext::new(handle, request))
        } else {
            Self::NoReply(NoReplyContext::new(handle, request))
        })
    }

    fn inner(&self) -> &dyn Context {
        match self {
            Self::Simple(ctx) => ctx,
            Self::Pack(ctx) => ctx,
            Self::Object(ctx) => ctx,
            Self::NoReply(ctx) => ctx,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Context {
        match self {
            Self::Simple(ctx) => ctx,
            Self::Pack(ctx) => ctx,
            Self::Object(ctx) => ctx,
            Self::NoReply(ctx) => ctx,
        }
    }
}

impl Context for AnyContext {
    fn base(&self) -> &ContextBase {
        self.inner().base()
    }

    fn base_mut(&mut self) -> &mut ContextBase {
        self.inner_mut().base_mut()
    }

    fn reply(&mut self, owner: &mut dyn ContextOwner, reply: Arc<dyn Reply>) -> Result<(), ContextError> {
        self.inner_mut().reply(owner, reply)
    }

    fn fail(&mut self, owner: &mut dyn ContextOwner, reason: &str) -> Result<(), ContextError> {
        self.inner_mut().fail(owner, reason)
    }
}

/// Open a context for an incoming command and start it.
///
/// Packs dispatch their first member right away. The returned handle
/// identifies the exchange until the context is done.
pub fn open_request(
    manager: &mut ContextManager<AnyContext>,
    owner: &mut dyn ContextOwner,
    request: Message,
) -> Result<Handle, ContextError> {
    let handle = manager.try_create(|handle| AnyContext::for_request(handle, request))?;
    if let Some(AnyContext::Pack(pack)) = manager.get_mut(handle) {
        pack.start(owner)?;
    }
    Ok(handle)
}
