//! Worker contract
//!
//! A worker is an actor with exactly one execution context. Its handlers run
//! one at a time on its own task and never share state with other workers.
//! Every handler gets the [`WorkerContext`], the worker's view of the router.

use async_trait::async_trait;
use tracing::{debug, error, warn};
use types::protocol::reply_ok;
use types::{Message, WorkerId};

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::events::Event;

/// What the runner does after a handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Log and keep processing
    Resume,
    /// Leave the message loop and stop the worker
    Stop,
}

#[async_trait]
pub trait Worker: Send + 'static {
    /// Called once on the worker's own task before the first delivery.
    async fn on_run(&mut self, ctx: &mut WorkerContext) -> Result<(), WorkerError> {
        let _ = ctx;
        Ok(())
    }

    /// Generic messages, neither command nor reply.
    async fn on_msg(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        error!(worker = ctx.name(), msg_id = %msg.id(), "Unhandled message");
        Err(WorkerError::unhandled(ctx.name(), "message"))
    }

    async fn on_command(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        let command = msg.command().map_or("<none>", |c| c.type_name());
        error!(worker = ctx.name(), msg_id = %msg.id(), command, "Unhandled command");
        Err(WorkerError::unhandled(ctx.name(), "command"))
    }

    /// Replies without a callback owned by this worker.
    ///
    /// Replies to commands that expect no answer are accepted silently.
    async fn on_reply(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        if msg.command().is_some_and(|c| !c.expects_reply()) {
            return Ok(());
        }
        let ok = msg.reply().is_some_and(|r| reply_ok(msg.command(), r));
        error!(worker = ctx.name(), msg_id = %msg.id(), ok, "Unhandled reply");
        Err(WorkerError::unhandled(ctx.name(), "reply"))
    }

    async fn on_event(&mut self, ctx: &mut WorkerContext, event: Event) -> Result<(), WorkerError> {
        let _ = (ctx, event);
        Ok(())
    }

    /// `peer` was disconnected from this worker or left the broker.
    /// Exchanges waiting on it will not complete on their own.
    async fn on_peer_lost(&mut self, ctx: &mut WorkerContext, peer: WorkerId) -> Result<(), WorkerError> {
        debug!(worker = ctx.name(), %peer, "Peer lost");
        Ok(())
    }

    /// Decide what happens after a handler error.
    fn on_error(&mut self, ctx: &WorkerContext, error: &WorkerError) -> Directive {
        if ctx.settings().strict || error.is_terminal() {
            warn!(worker = ctx.name(), error = %error, "Worker stopping after error");
            Directive::Stop
        } else {
            Directive::Resume
        }
    }

    /// Called once after the message loop ended.
    async fn on_stop(&mut self, ctx: &mut WorkerContext) -> Result<(), WorkerError> {
        let _ = ctx;
        Ok(())
    }
}
