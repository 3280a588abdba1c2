//! Worker task
//!
//! Each running worker is one tokio task that owns the worker, its context
//! and its mailbox receiver. The task runs inside the worker's
//! [`ContextId`](types::ContextId) scope, which is what callbacks check
//! before they fire.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use router_config::WorkerSettings;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use types::protocol::reply_ok;
use types::{Message, ProtocolError};

use crate::broker::Broker;
use crate::context::WorkerContext;
use crate::error::WorkerError;
use crate::interceptor::InterceptorChain;
use crate::mailbox::{Control, Delivery, MailboxReceiver, Received};
use crate::proxy::{PeerRef, ProxyShared};
use crate::worker::{Directive, Worker};

/// The parts of a registered worker that move onto its task at start
pub(crate) struct PendingWorker<W> {
    worker: W,
    receiver: MailboxReceiver,
    pub(crate) chain: InterceptorChain,
}

impl<W: Worker> PendingWorker<W> {
    pub(crate) fn new(worker: W, receiver: MailboxReceiver, chain: InterceptorChain) -> Self {
        Self { worker, receiver, chain }
    }
}

pub(crate) struct LaunchSetup {
    pub broker: Broker,
    pub shared: Arc<ProxyShared>,
    pub settings: WorkerSettings,
    pub consumers: Vec<PeerRef>,
    pub producers: Vec<PeerRef>,
    pub runtime: tokio::runtime::Handle,
}

/// Type-erased start of a pending worker, kept by the broker registry
pub(crate) trait Launch: Send {
    fn launch(self: Box<Self>, setup: LaunchSetup) -> JoinHandle<()>;
}

impl<W: Worker> Launch for PendingWorker<W> {
    fn launch(self: Box<Self>, setup: LaunchSetup) -> JoinHandle<()> {
        let PendingWorker { worker, receiver, chain } = *self;
        let LaunchSetup { broker, shared, settings, consumers, producers, runtime } = setup;

        let context = shared.context();
        let span = info_span!("worker", name = %shared.name(), id = %shared.id());
        let mut ctx = WorkerContext::new(broker, shared, settings, chain);
        for peer in consumers {
            ctx.add_consumer(peer);
        }
        for peer in producers {
            ctx.add_producer(peer);
        }

        let task = WorkerTask { worker, receiver, ctx };
        runtime.spawn(context.scope(task.run()).instrument(span))
    }
}

struct WorkerTask<W> {
    worker: W,
    receiver: MailboxReceiver,
    ctx: WorkerContext,
}

impl<W: Worker> WorkerTask<W> {
    async fn run(mut self) {
        let started = Instant::now();
        info!(
            worker = self.ctx.name(),
            context = %self.ctx.context_id(),
            consumers = self.ctx.consumers().len(),
            producers = self.ctx.producers().len(),
            "Worker started"
        );

        let result = self.worker.on_run(&mut self.ctx).await;
        let mut running = self.settle(result) && self.drain_loopback().await;

        while running && !self.ctx.stop_requested() {
            let Some(received) = self.receiver.recv().await else {
                debug!(worker = self.ctx.name(), "Mailbox closed");
                break;
            };
            match received {
                Received::Control(Control::Stop) => {
                    debug!(worker = self.ctx.name(), "Stop requested");
                    break;
                }
                Received::Delivery(delivery) => {
                    let result = self.handle(delivery).await;
                    running = self.settle(result) && self.drain_loopback().await;
                }
            }
        }

        let mut discarded = 0usize;
        while self.receiver.try_next().is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(worker = self.ctx.name(), discarded, "Pending deliveries discarded");
        }

        if let Err(e) = self.worker.on_stop(&mut self.ctx).await {
            error!(worker = self.ctx.name(), error = %e, "Worker failed to stop cleanly");
        }
        self.ctx.finish();

        info!(
            worker = self.ctx.name(),
            runtime_ms = started.elapsed().as_millis() as u64,
            "Worker stopped"
        );
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<(), WorkerError> {
        match delivery {
            Delivery::Message(msg) => self.receive(msg).await,
            Delivery::Event(event) => self.worker.on_event(&mut self.ctx, event).await,
            Delivery::Invoke(invoke) => {
                invoke(&mut self.worker as &mut dyn Any, &mut self.ctx);
                Ok(())
            }
            Delivery::Link(change) => match self.ctx.apply_link(change) {
                Some(peer) => self.worker.on_peer_lost(&mut self.ctx, peer).await,
                None => Ok(()),
            },
        }
    }

    /// Inbound chain, then dispatch of whatever the chain lets through.
    async fn receive(&mut self, msg: Message) -> Result<(), WorkerError> {
        for msg in self.ctx.inbound(msg)? {
            if self.ctx.settings().print_msgs {
                info!(worker = self.ctx.name(), direction = "in", "{}", self.ctx.dump(&msg));
            }
            self.dispatch(msg).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, msg: Message) -> Result<(), WorkerError> {
        msg.check_service_data()?;

        if msg.is_reply() {
            let owned = msg.attached().filter(|a| a.is_owned_by(self.ctx.id())).cloned();
            if let (Some(attached), Some(reply)) = (owned, msg.reply()) {
                if let Some(callback) = attached.callback() {
                    let ok = reply_ok(Some(attached.command().as_ref()), reply);
                    match callback.take(ok) {
                        Ok(body) => {
                            body(&mut self.worker as &mut dyn Any, &mut self.ctx as &mut dyn Any, &msg);
                        }
                        // Another consumer answered first.
                        Err(ProtocolError::CallbackConsumed { .. }) => {
                            debug!(
                                worker = self.ctx.name(),
                                msg_id = %msg.id(),
                                request_id = ?msg.request_id(),
                                "Extra reply for a consumed callback dropped"
                            );
                        }
                        Err(e) => return Err(e.into()),
                    }
                    return Ok(());
                }
            }
            return self.worker.on_reply(&mut self.ctx, msg).await;
        }
        if msg.is_command() {
            return self.worker.on_command(&mut self.ctx, msg).await;
        }
        self.worker.on_msg(&mut self.ctx, msg).await
    }

    async fn drain_loopback(&mut self) -> bool {
        while let Some(msg) = self.ctx.take_loopback() {
            let result = self.receive(msg).await;
            if !self.settle(result) {
                return false;
            }
        }
        true
    }

    /// `false` when the worker has to stop.
    fn settle(&mut self, result: Result<(), WorkerError>) -> bool {
        let Err(error) = result else {
            return true;
        };
        error!(worker = self.ctx.name(), error = %error, "Handler failed");
        match self.worker.on_error(&self.ctx, &error) {
            Directive::Resume if !error.is_terminal() => true,
            directive => {
                warn!(worker = self.ctx.name(), ?directive, "Leaving message loop");
                false
            }
        }
    }
}
