//! Worker that echoes generic messages to its consumers

use async_trait::async_trait;
use tracing::debug;
use types::Message;

use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::worker::Worker;

/// Forwards the payload of every generic message to its own consumers.
#[derive(Debug, Clone, Default)]
pub struct Repeater {
    prevent_loopback: bool,
}

impl Repeater {
    /// With `prevent_loopback`, a message is never repeated back to the
    /// worker that sent it.
    pub fn new(prevent_loopback: bool) -> Self {
        Self { prevent_loopback }
    }
}

#[async_trait]
impl Worker for Repeater {
    async fn on_msg(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        let mut out = ctx.prepare_msg_with(msg.payload().clone());
        if self.prevent_loopback {
            let rest: Vec<_> = out.receivers().iter().copied().filter(|id| Some(*id) != msg.sender()).collect();
            out.set_receivers(rest);
        }
        if out.receivers().is_empty() {
            debug!(worker = ctx.name(), msg_id = %msg.id(), "Nobody to repeat to");
            return Ok(());
        }
        ctx.send(out)
    }
}
