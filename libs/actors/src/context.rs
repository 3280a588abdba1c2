//! The worker's view of the router
//!
//! [`WorkerContext`] lives on the worker's task next to the worker itself.
//! It owns the interceptor chain and the worker's edges, builds outgoing
//! messages and routes them: linked peers get a direct enqueue, everything
//! else goes through the broker.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_context::{ContextError, ContextOwner};
use router_config::WorkerSettings;
use tracing::{error, info, warn};
use types::protocol::{AttachedCommand, CallbackFn, CommandCallback};
use types::{Command, ContextId, Message, NameResolver, Payload, Reply, WorkerId};

use crate::broker::Broker;
use crate::builder::WorkerHandle;
use crate::error::WorkerError;
use crate::events::Event;
use crate::interceptor::InterceptorChain;
use crate::mailbox::LinkChange;
use crate::proxy::{PeerRef, ProxyShared};
use crate::worker::Worker;

pub struct WorkerContext {
    shared: Arc<ProxyShared>,
    settings: WorkerSettings,
    broker: Broker,
    consumers: Vec<PeerRef>,
    producers: Vec<PeerRef>,
    chain: InterceptorChain,
    loopback: VecDeque<Message>,
    stop_requested: bool,
}

impl WorkerContext {
    pub(crate) fn new(broker: Broker, shared: Arc<ProxyShared>, settings: WorkerSettings, chain: InterceptorChain) -> Self {
        Self {
            shared,
            settings,
            broker,
            consumers: Vec::new(),
            producers: Vec::new(),
            chain,
            loopback: VecDeque::new(),
            stop_requested: false,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Execution context this worker runs on.
    pub fn context_id(&self) -> ContextId {
        self.shared.context()
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Live consumers, in the order they were linked.
    pub fn consumers(&self) -> Vec<WorkerId> {
        self.consumers.iter().filter(|p| p.is_alive()).map(PeerRef::id).collect()
    }

    pub fn producers(&self) -> Vec<WorkerId> {
        self.producers.iter().filter(|p| p.is_alive()).map(PeerRef::id).collect()
    }

    pub fn is_consumer(&self, id: WorkerId) -> bool {
        self.consumers.iter().any(|p| p.id() == id && p.is_alive())
    }

    pub fn is_producer(&self, id: WorkerId) -> bool {
        self.producers.iter().any(|p| p.id() == id && p.is_alive())
    }

    pub(crate) fn add_consumer(&mut self, peer: PeerRef) {
        if !self.consumers.iter().any(|p| p.id() == peer.id()) {
            self.consumers.push(peer);
        }
    }

    pub(crate) fn add_producer(&mut self, peer: PeerRef) {
        if !self.producers.iter().any(|p| p.id() == peer.id()) {
            self.producers.push(peer);
        }
    }

    /// Apply an edge change; returns the peer that is no longer linked at
    /// all, if the change cut the last edge to it.
    pub(crate) fn apply_link(&mut self, change: LinkChange) -> Option<WorkerId> {
        let dropped = match change {
            LinkChange::AddConsumer(peer) => {
                self.add_consumer(peer);
                return None;
            }
            LinkChange::AddProducer(peer) => {
                self.add_producer(peer);
                return None;
            }
            LinkChange::DropConsumer(id) => {
                self.consumers.retain(|p| p.id() != id);
                id
            }
            LinkChange::DropProducer(id) => {
                self.producers.retain(|p| p.id() != id);
                id
            }
            LinkChange::Remove(id) => {
                self.consumers.retain(|p| p.id() != id);
                self.producers.retain(|p| p.id() != id);
                id
            }
        };
        (!self.is_consumer(dropped) && !self.is_producer(dropped)).then_some(dropped)
    }

    fn prune(&mut self) {
        self.consumers.retain(PeerRef::is_alive);
        self.producers.retain(PeerRef::is_alive);
    }

    fn linked(&self, id: WorkerId) -> Option<Arc<ProxyShared>> {
        self.consumers
            .iter()
            .chain(self.producers.iter())
            .find(|p| p.id() == id)
            .and_then(PeerRef::upgrade)
    }

    /// Fresh message addressed to every live consumer.
    pub fn prepare_msg(&self) -> Message {
        Message::addressed(Some(self.id()), self.consumers())
    }

    pub fn prepare_msg_with(&self, payload: Payload) -> Message {
        let mut msg = self.prepare_msg();
        msg.set_payload(payload);
        msg
    }

    /// Fresh message addressed by worker name; every name must be registered.
    pub fn prepare_msg_to<S: AsRef<str>>(&self, names: &[S]) -> Result<Message, WorkerError> {
        Ok(Message::to_names(Some(self.id()), &self.broker, names)?)
    }

    pub fn prepare_broadcast(&self) -> Message {
        let mut msg = Message::new(Some(self.id()));
        msg.set_broadcast(true);
        msg
    }

    /// Invalid message; proxies drop it on arrival.
    pub fn prepare_msg_bad(&self, reason: &str) -> Message {
        let mut msg = self.prepare_msg();
        msg.invalidate(reason);
        msg
    }

    pub fn prepare_command(&self, command: Arc<dyn Command>) -> Message {
        let mut msg = self.prepare_msg();
        msg.set_command(command);
        msg
    }

    /// Command whose reply runs `on_done` on this worker's own context.
    pub fn prepare_command_with<W, F>(&self, command: Arc<dyn Command>, on_done: F) -> Message
    where
        W: Worker,
        F: FnOnce(&mut W, &mut WorkerContext, &Message) + Send + 'static,
    {
        let callback = CommandCallback::new(self.id(), self.context_id(), erase::<W, F>(self.name(), on_done));
        self.with_callback(command, callback)
    }

    /// Like [`prepare_command_with`](Self::prepare_command_with), with a
    /// separate body for replies that do not satisfy the command.
    pub fn prepare_command_with_fail<W, D, E>(&self, command: Arc<dyn Command>, on_done: D, on_fail: E) -> Message
    where
        W: Worker,
        D: FnOnce(&mut W, &mut WorkerContext, &Message) + Send + 'static,
        E: FnOnce(&mut W, &mut WorkerContext, &Message) + Send + 'static,
    {
        let callback = CommandCallback::new(self.id(), self.context_id(), erase::<W, D>(self.name(), on_done))
            .with_fail(erase::<W, E>(self.name(), on_fail));
        self.with_callback(command, callback)
    }

    fn with_callback(&self, command: Arc<dyn Command>, callback: CommandCallback) -> Message {
        let mut msg = self.prepare_msg();
        msg.attach_command(AttachedCommand::with_callback(command, callback));
        msg
    }

    /// Reply to `request`, addressed back to its sender.
    pub fn prepare_reply(&self, request: &Message, reply: Arc<dyn Reply>) -> Message {
        request.reply_to(self.id(), reply)
    }

    pub fn reply(&mut self, request: &Message, reply: Arc<dyn Reply>) -> Result<(), WorkerError> {
        let msg = self.prepare_reply(request, reply);
        self.send(msg)
    }

    /// Run `msg` through the chain towards the broker and route what comes
    /// out. A failing stage stops this worker.
    pub fn send(&mut self, msg: Message) -> Result<(), WorkerError> {
        if !self.shared.is_started() {
            return Err(WorkerError::NotStarted(self.name().to_string()));
        }
        if self.shared.is_stopped() {
            return Err(WorkerError::Stopped(self.name().to_string()));
        }
        let out = match self.chain.outbound(msg) {
            Ok(out) => out,
            Err(e) => {
                self.stop_requested = true;
                return Err(e);
            }
        };
        for msg in out {
            if self.settings.print_msgs {
                info!(worker = self.name(), direction = "out", "{}", self.dump(&msg));
            }
            self.route(msg);
        }
        Ok(())
    }

    fn route(&mut self, mut msg: Message) {
        self.prune();
        if msg.is_broadcast() {
            self.broker.fan_out(msg, Some(self.id()));
            return;
        }
        if msg.receivers().is_empty() {
            if self.broker.settings().warn_no_receivers {
                warn!(worker = self.name(), msg_id = %msg.id(), "Message has no receivers");
            }
            return;
        }

        let mut rest = Vec::new();
        for id in msg.receivers().iter().copied() {
            if id == self.id() {
                self.loopback.push_back(msg.clone());
            } else if let Some(peer) = self.linked(id) {
                peer.offer(msg.clone());
            } else {
                rest.push(id);
            }
        }
        if !rest.is_empty() {
            msg.set_receivers(rest);
            msg.set_direct(true);
            self.broker.fan_out(msg, Some(self.id()));
        }
    }

    /// Multi-line dump with receivers shown by name.
    pub fn dump(&self, msg: &Message) -> String {
        msg.debug_dump(Some(&self.broker as &dyn NameResolver))
    }

    /// Publish a process-wide event to every other running worker.
    pub fn publish_event<T: Any + Send + Sync>(&self, body: T) -> usize {
        self.broker.publish(Event::new(Some(self.id()), body))
    }

    /// Handle for posting closures back onto this worker's context.
    pub fn handle<W: Worker>(&self) -> WorkerHandle<W> {
        WorkerHandle::new(&self.shared)
    }

    /// Leave the message loop after the current delivery.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub(crate) fn take_loopback(&mut self) -> Option<Message> {
        self.loopback.pop_front()
    }

    pub(crate) fn inbound(&mut self, msg: Message) -> Result<Vec<Message>, WorkerError> {
        self.chain.inbound(msg)
    }

    pub(crate) fn finish(&mut self) {
        self.shared.mark_stopped();
        self.broker.unregister(self.id());
    }
}

fn erase<W, F>(owner: &str, body: F) -> CallbackFn
where
    W: Worker,
    F: FnOnce(&mut W, &mut WorkerContext, &Message) + Send + 'static,
{
    let owner = owner.to_string();
    Box::new(move |worker: &mut dyn Any, ctx: &mut dyn Any, msg: &Message| {
        match (worker.downcast_mut::<W>(), ctx.downcast_mut::<WorkerContext>()) {
            (Some(worker), Some(ctx)) => body(worker, ctx, msg),
            _ => error!(worker = %owner, msg_id = %msg.id(), "Callback invoked on the wrong worker type"),
        }
    })
}

impl ContextOwner for WorkerContext {
    fn label(&self) -> &str {
        self.name()
    }

    fn prepare_msg(&self) -> Message {
        WorkerContext::prepare_msg(self)
    }

    fn prepare_reply(&self, request: &Message, reply: Arc<dyn Reply>) -> Message {
        WorkerContext::prepare_reply(self, request, reply)
    }

    fn send(&mut self, msg: Message) -> Result<(), ContextError> {
        WorkerContext::send(self, msg).map_err(ContextError::send_failed)
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("consumers", &self.consumers)
            .field("producers", &self.producers)
            .field("interceptors", &self.chain.names())
            .finish()
    }
}
