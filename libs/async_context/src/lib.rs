//! # Async Context
//!
//! Correlation state for request/reply exchanges that outlive a single
//! handler call. A worker stores one [`Context`] per in-flight request in
//! its [`ContextManager`], ships the returned [`Handle`] with whatever it
//! asks of other workers, and feeds the eventual reply back through the
//! handle.
//!
//! ```
//! use std::sync::Arc;
//! use async_context::{AnyContext, ContextManager};
//! use types::protocol::{CommandAck, ReplyOk};
//! # use async_context::{ContextError, ContextOwner};
//! # use types::{protocol::Reply, Message, WorkerId};
//! # struct Owner(Vec<Message>, WorkerId);
//! # impl ContextOwner for Owner {
//! #     fn label(&self) -> &str { "doc" }
//! #     fn prepare_msg(&self) -> Message { Message::new(Some(self.1)) }
//! #     fn prepare_reply(&self, req: &Message, r: Arc<dyn Reply>) -> Message { req.reply_to(self.1, r) }
//! #     fn send(&mut self, m: Message) -> Result<(), ContextError> { self.0.push(m); Ok(()) }
//! # }
//! # let mut owner = Owner(Vec::new(), WorkerId::new());
//! let mut request = Message::new(Some(WorkerId::new()));
//! request.set_command(Arc::new(CommandAck::default()));
//!
//! let mut contexts: ContextManager<AnyContext> = ContextManager::new("cache");
//! let handle = async_context::open_request(&mut contexts, &mut owner, request).unwrap();
//!
//! // ... later, when the backend answers
//! contexts.deliver(&mut owner, handle, Arc::new(ReplyOk)).unwrap();
//! assert_eq!(contexts.clear_done(), 1);
//! ```

pub mod context;
pub mod contexts;
pub mod error;
pub mod handle;
pub mod manager;

pub use context::{Context, ContextBase, ContextOwner, WithDispatch};
pub use contexts::{
    open_request, AnyContext, NoReplyContext, ObjectContext, ObjectMode, PackContext, SimpleContext,
};
pub use error::ContextError;
pub use handle::Handle;
pub use manager::{ContextManager, MAX_SLOTS};
