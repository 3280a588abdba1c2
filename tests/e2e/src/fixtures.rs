//! Workers used by the scenarios
//!
//! - [`Probe`] records everything it receives and can act once on start.
//! - [`CacheWorker`] answers read commands from a slow, possibly broken
//!   backend, correlating each exchange with an async context.
//! - [`BusPoller`] takes turns on a shared priority channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_context::{open_request, AnyContext, Context, ContextError, ContextManager, Handle, WithDispatch};
use async_trait::async_trait;
use messaging_actors::{Event, Worker, WorkerContext, WorkerError, WorkerHandle};
use sync_channel::ChannelUser;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use types::protocol::{Command, CommandAck, CommandRequestPayload, Reply, ReplyFail, ReplyOk, ReplyPayload};
use types::{Message, Payload, WorkerId};

const OBSERVE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a [`Probe`] saw, in arrival order
#[derive(Debug)]
pub enum Observation {
    Message(Message),
    Command(Message),
    Reply(Message),
    /// Reply consumed by a callback attached on start
    Callback(Message),
    Event(Event),
}

impl Observation {
    pub fn into_message(self) -> Result<Message> {
        match self {
            Self::Message(msg) | Self::Command(msg) | Self::Reply(msg) | Self::Callback(msg) => Ok(msg),
            Self::Event(event) => Err(anyhow!("expected a message, got event {}", event.type_name())),
        }
    }
}

type OnStart = Box<dyn FnOnce(&mut WorkerContext) -> Result<(), WorkerError> + Send>;

/// Worker that reports every delivery to the test
pub struct Probe {
    seen: mpsc::UnboundedSender<Observation>,
    on_start: Option<OnStart>,
}

/// Test side of a [`Probe`]
pub struct ProbeReceiver {
    rx: mpsc::UnboundedReceiver<Observation>,
}

impl Probe {
    pub fn new() -> (Self, ProbeReceiver) {
        let (seen, rx) = mpsc::unbounded_channel();
        (Self { seen, on_start: None }, ProbeReceiver { rx })
    }

    /// Run `f` once the worker is started.
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut WorkerContext) -> Result<(), WorkerError> + Send + 'static,
    {
        self.on_start = Some(Box::new(f));
        self
    }

    pub fn record(&self, observation: Observation) {
        let _ = self.seen.send(observation);
    }
}

#[async_trait]
impl Worker for Probe {
    async fn on_run(&mut self, ctx: &mut WorkerContext) -> Result<(), WorkerError> {
        match self.on_start.take() {
            Some(start) => start(ctx),
            None => Ok(()),
        }
    }

    async fn on_msg(&mut self, _ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        self.record(Observation::Message(msg));
        Ok(())
    }

    async fn on_command(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        let expects_reply = msg.command().is_some_and(|command| command.expects_reply());
        if expects_reply {
            ctx.reply(&msg, Arc::new(ReplyOk))?;
        }
        self.record(Observation::Command(msg));
        Ok(())
    }

    async fn on_reply(&mut self, _ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        self.record(Observation::Reply(msg));
        Ok(())
    }

    async fn on_event(&mut self, _ctx: &mut WorkerContext, event: Event) -> Result<(), WorkerError> {
        self.record(Observation::Event(event));
        Ok(())
    }
}

impl ProbeReceiver {
    /// Next observation, failing after a few seconds of silence.
    pub async fn next(&mut self) -> Result<Observation> {
        match tokio::time::timeout(OBSERVE_TIMEOUT, self.rx.recv()).await {
            Ok(Some(observation)) => Ok(observation),
            Ok(None) => bail!("probe is gone"),
            Err(_) => bail!("nothing observed within {:?}", OBSERVE_TIMEOUT),
        }
    }

    pub async fn next_message(&mut self) -> Result<Message> {
        self.next().await?.into_message()
    }

    /// Fail if anything arrives within `quiet`.
    pub async fn expect_none(&mut self, quiet: Duration) -> Result<()> {
        match tokio::time::timeout(quiet, self.rx.recv()).await {
            Ok(Some(observation)) => bail!("unexpected observation: {observation:?}"),
            Ok(None) | Err(_) => Ok(()),
        }
    }
}

/// Storage behind a [`CacheWorker`]
#[derive(Debug, Clone)]
pub struct Backend {
    pub up: bool,
    pub latency: Duration,
    pub data: Payload,
}

impl Backend {
    pub fn new(data: Payload) -> Self {
        Self {
            up: true,
            latency: Duration::from_millis(10),
            data,
        }
    }

    pub fn down() -> Self {
        Self {
            up: false,
            ..Self::new(Payload::new())
        }
    }

    /// Answer `command` off the worker's task, then hand the outcome back.
    fn start(&self, worker: WorkerHandle<CacheWorker>, handle: Handle, command: Arc<dyn Command>) {
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backend.latency).await;
            let outcome = backend.read(command.as_ref());
            if let Err(e) = worker.post(move |me, ctx| me.complete(ctx, handle, outcome)) {
                warn!(%handle, error = %e, "Backend result dropped");
            }
        });
    }

    fn read(&self, command: &dyn Command) -> Result<Arc<dyn Reply>, String> {
        if !self.up {
            return Err("backend unavailable".to_string());
        }
        if let Some(request) = command.downcast_ref::<CommandRequestPayload>() {
            let payload = match &request.path {
                None => self.data.clone(),
                Some(path) => {
                    let value = self.data.get(path).ok_or_else(|| format!("no data at {path}"))?;
                    let mut payload = Payload::new();
                    payload.set("value", value.clone()).map_err(|e| e.to_string())?;
                    payload
                }
            };
            return Ok(Arc::new(ReplyPayload::success(payload)));
        }
        if command.downcast_ref::<CommandAck>().is_some() {
            return Ok(Arc::new(ReplyOk));
        }
        Err(format!("unsupported command {}", command.type_name()))
    }
}

/// Context lifecycle as seen by a [`CacheWorker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTrace {
    Opened(Handle),
    Completed(Handle),
}

/// Answers commands through a backend that replies later
pub struct CacheWorker {
    backend: Backend,
    contexts: ContextManager<AnyContext>,
    trace: Option<mpsc::UnboundedSender<CacheTrace>>,
}

impl CacheWorker {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            contexts: ContextManager::new("cache"),
            trace: None,
        }
    }

    pub fn traced(backend: Backend) -> (Self, mpsc::UnboundedReceiver<CacheTrace>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut worker = Self::new(backend);
        worker.trace = Some(tx);
        (worker, rx)
    }

    fn emit(&self, trace: CacheTrace) {
        if let Some(tx) = &self.trace {
            let _ = tx.send(trace);
        }
    }

    fn dispatcher(
        &self,
        me: WorkerHandle<CacheWorker>,
    ) -> impl FnMut(&mut WorkerContext, &Arc<dyn Command>, Handle) -> Result<(), ContextError> + 'static {
        let backend = self.backend.clone();
        move |_ctx, command, handle| {
            backend.start(me.clone(), handle, Arc::clone(command));
            Ok(())
        }
    }

    fn complete(&mut self, ctx: &mut WorkerContext, handle: Handle, outcome: Result<Arc<dyn Reply>, String>) {
        let reply: Arc<dyn Reply> = match outcome {
            Ok(reply) => reply,
            Err(reason) => Arc::new(ReplyFail::new(reason)),
        };
        let dispatch = self.dispatcher(ctx.handle());
        let mut owner = WithDispatch::new(ctx, dispatch);
        match self.contexts.deliver(&mut owner, handle, reply) {
            Ok(true) => self.emit(CacheTrace::Completed(handle)),
            Ok(false) => warn!(%handle, "Backend answered for an unknown context"),
            Err(e) => warn!(%handle, error = %e, "Reply could not be delivered"),
        }
        let cleared = self.contexts.clear_done();
        debug!(cleared, live = self.contexts.len(), "Contexts swept");
    }
}

#[async_trait]
impl Worker for CacheWorker {
    async fn on_command(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
        let Some(command) = msg.attached().map(|attached| Arc::clone(attached.command())) else {
            return Err(WorkerError::other("command message without a command"));
        };
        let dispatch = self.dispatcher(ctx.handle());
        let mut owner = WithDispatch::new(&mut *ctx, dispatch);
        let handle = open_request(&mut self.contexts, &mut owner, msg).map_err(WorkerError::other)?;
        self.emit(CacheTrace::Opened(handle));

        // Packs dispatch their own members; a plain request is read here.
        if let Ok(AnyContext::Simple(_)) = self.contexts.get(handle) {
            self.backend.start(ctx.handle(), handle, command);
        }
        self.contexts.clear_done();
        Ok(())
    }

    async fn on_peer_lost(&mut self, ctx: &mut WorkerContext, peer: WorkerId) -> Result<(), WorkerError> {
        let swept = self.contexts.fail_and_clear(ctx, "requester disconnected", |pending| {
            pending.request().sender() == Some(peer)
        });
        if swept > 0 {
            warn!(worker = ctx.name(), %peer, swept, "Pending requests failed after disconnect");
        }
        Ok(())
    }
}

/// Sends one payload to its consumers per grant on a shared channel
pub struct BusPoller {
    label: String,
    user: Option<ChannelUser>,
    asked: mpsc::UnboundedSender<String>,
}

impl BusPoller {
    /// `asked` hears the label once the poller is queued on the channel.
    pub fn new(label: impl Into<String>, user: ChannelUser, asked: mpsc::UnboundedSender<String>) -> Self {
        Self {
            label: label.into(),
            user: Some(user),
            asked,
        }
    }

    fn poll(&mut self, ctx: &mut WorkerContext) -> Result<(), WorkerError> {
        let mut payload = Payload::new();
        payload.set("poller", self.label.as_str()).map_err(WorkerError::other)?;
        let msg = ctx.prepare_msg_with(payload);
        ctx.send(msg)
    }
}

/// Ask once, wait for the grant, run the poll on the worker, release.
async fn drive(mut user: ChannelUser, worker: WorkerHandle<BusPoller>, label: String, asked: mpsc::UnboundedSender<String>) {
    if let Err(e) = user.ask_trigger() {
        warn!(poller = %label, error = %e, "Could not queue on the channel");
        return;
    }
    let _ = asked.send(label.clone());

    let Some(trigger) = user.next_trigger().await else {
        return;
    };
    debug!(poller = %label, user = %trigger.user, "Channel granted");
    if let Err(e) = user.job_started() {
        warn!(poller = %label, error = %e, "Job start rejected");
    }

    let (done_tx, done_rx) = oneshot::channel();
    let posted = worker.post(move |me, ctx| {
        if let Err(e) = me.poll(ctx) {
            warn!(worker = ctx.name(), error = %e, "Poll failed");
        }
        let _ = done_tx.send(());
    });
    if posted.is_ok() {
        let _ = done_rx.await;
    }
    if let Err(e) = user.job_done() {
        warn!(poller = %label, error = %e, "Job completion rejected");
    }
}

#[async_trait]
impl Worker for BusPoller {
    async fn on_run(&mut self, ctx: &mut WorkerContext) -> Result<(), WorkerError> {
        let Some(user) = self.user.take() else {
            return Ok(());
        };
        tokio::spawn(drive(user, ctx.handle(), self.label.clone(), self.asked.clone()));
        Ok(())
    }
}
