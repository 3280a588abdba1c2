//! Channel task
//!
//! A [`Channel`] owns a [`ChannelState`] inside its own tokio task. Users
//! talk to it through [`ChannelUser`] handles that only enqueue events, so
//! every state transition is serialized by the task's single event queue.

use std::collections::HashMap;
use std::time::Duration;

use router_config::ChannelSettings;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::state::{ChannelState, Priority, UserId};

const BUSY_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Grant delivered to the user that may now use the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub user: UserId,
    pub granted_at: Instant,
}

enum Event {
    Register {
        priority: Priority,
        triggers: mpsc::UnboundedSender<Trigger>,
        reply: oneshot::Sender<UserId>,
    },
    Unregister(UserId),
    Ask(UserId),
    JobStarted(UserId),
    JobDone(UserId),
    WhoIsBusy(oneshot::Sender<Option<UserId>>),
}

/// Handle to a running channel task. Dropping it closes the channel once
/// every [`ChannelUser`] is gone too.
#[derive(Debug)]
pub struct Channel {
    name: String,
    events: mpsc::UnboundedSender<Event>,
    task: JoinHandle<()>,
}

impl Channel {
    /// Start the channel task on the current runtime.
    pub fn spawn(settings: &ChannelSettings) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        let task = ChannelTask {
            name: settings.name.clone(),
            frame_gap: settings.frame_gap(),
            state: ChannelState::new(),
            triggers: Default::default(),
            events: rx,
            last_trigger: None,
            hold_until: None,
            ignore: None,
        };
        info!(channel = %settings.name, frame_gap_ms = settings.frame_gap_ms, "Channel started");
        Self {
            name: settings.name.clone(),
            events,
            task: tokio::spawn(task.run()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a user with the given priority.
    pub async fn register(&self, priority: Priority) -> Result<ChannelUser, ChannelError> {
        let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(Event::Register { priority, triggers: triggers_tx, reply: reply_tx })
            .map_err(|_| ChannelError::closed(&self.name))?;
        let id = reply_rx.await.map_err(|_| ChannelError::closed(&self.name))?;
        Ok(ChannelUser {
            id,
            channel: self.name.clone(),
            events: self.events.clone(),
            triggers: triggers_rx,
        })
    }

    pub async fn who_is_busy(&self) -> Result<Option<UserId>, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::WhoIsBusy(tx))
            .map_err(|_| ChannelError::closed(&self.name))?;
        rx.await.map_err(|_| ChannelError::closed(&self.name))
    }

    /// Stop the task right away, dropping pending grants.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// One registered user. Dropping it unregisters the user and releases the
/// channel if it was held.
#[derive(Debug)]
pub struct ChannelUser {
    id: UserId,
    channel: String,
    events: mpsc::UnboundedSender<Event>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
}

impl ChannelUser {
    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn ask_trigger(&self) -> Result<(), ChannelError> {
        self.post(Event::Ask(self.id))
    }

    pub fn job_started(&self) -> Result<(), ChannelError> {
        self.post(Event::JobStarted(self.id))
    }

    pub fn job_done(&self) -> Result<(), ChannelError> {
        self.post(Event::JobDone(self.id))
    }

    /// Wait for the next grant; `None` once the channel is gone.
    pub async fn next_trigger(&mut self) -> Option<Trigger> {
        self.triggers.recv().await
    }

    /// Non-blocking variant of [`next_trigger`](Self::next_trigger).
    pub fn try_trigger(&mut self) -> Option<Trigger> {
        self.triggers.try_recv().ok()
    }

    fn post(&self, event: Event) -> Result<(), ChannelError> {
        self.events.send(event).map_err(|_| ChannelError::closed(&self.channel))
    }
}

impl Drop for ChannelUser {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Unregister(self.id));
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Register { priority, .. } => write!(f, "Register({priority:?})"),
            Event::Unregister(id) => write!(f, "Unregister({id})"),
            Event::Ask(id) => write!(f, "Ask({id})"),
            Event::JobStarted(id) => write!(f, "JobStarted({id})"),
            Event::JobDone(id) => write!(f, "JobDone({id})"),
            Event::WhoIsBusy(_) => f.write_str("WhoIsBusy"),
        }
    }
}

struct ChannelTask {
    name: String,
    frame_gap: Duration,
    state: ChannelState,
    triggers: HashMap<UserId, mpsc::UnboundedSender<Trigger>>,
    events: mpsc::UnboundedReceiver<Event>,
    last_trigger: Option<Instant>,
    /// Set while a grant is deferred by the frame gap
    hold_until: Option<Instant>,
    ignore: Option<UserId>,
}

impl ChannelTask {
    async fn run(mut self) {
        let mut report = time::interval(BUSY_REPORT_INTERVAL);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let hold = self.hold_until;
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                _ = time::sleep_until(hold.unwrap_or_else(Instant::now)), if hold.is_some() => {
                    self.hold_until = None;
                    let ignore = self.ignore.take();
                    self.pump(ignore);
                }
                _ = report.tick() => {
                    if let Some(busy) = self.state.who_is_busy() {
                        debug!(channel = %self.name, %busy, "Busy on");
                    }
                }
            }
        }
        info!(channel = %self.name, "Channel closed");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Register { priority, triggers, reply } => {
                let id = self.state.register(priority);
                self.triggers.insert(id, triggers);
                let _ = reply.send(id);
            }
            Event::Unregister(id) => {
                self.triggers.remove(&id);
                let was_busy = self.state.who_is_busy() == Some(id);
                // Let the pump pick a successor so the frame gap applies.
                if was_busy {
                    self.state.release(id);
                }
                self.state.unregister(id);
                if was_busy {
                    self.pump(None);
                }
            }
            Event::Ask(id) => match self.state.mark_waiting(id) {
                Ok(()) => self.pump(None),
                Err(e) => warn!(channel = %self.name, error = %e, "Trigger request rejected"),
            },
            Event::JobStarted(id) => {
                if let Err(e) = self.state.on_job_start(id) {
                    warn!(channel = %self.name, error = %e, "Job start rejected");
                }
            }
            Event::JobDone(id) => {
                if self.state.release(id) {
                    self.pump(Some(id));
                }
            }
            Event::WhoIsBusy(reply) => {
                let _ = reply.send(self.state.who_is_busy());
            }
        }
    }

    /// Grant the channel if it is free and the frame gap has passed.
    fn pump(&mut self, ignore: Option<UserId>) {
        if self.state.is_busy() {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_trigger {
            let ready_at = last + self.frame_gap;
            if ready_at > now {
                self.hold_until = Some(ready_at);
                self.ignore = self.ignore.or(ignore);
                return;
            }
        }

        while let Some(user) = self.state.check_waiting(ignore) {
            self.last_trigger = Some(now);
            let delivered = self
                .triggers
                .get(&user)
                .is_some_and(|tx| tx.send(Trigger { user, granted_at: now }).is_ok());
            if delivered {
                debug!(channel = %self.name, %user, "Trigger sent");
                return;
            }
            warn!(channel = %self.name, %user, "Trigger receiver gone, dropping user");
            self.triggers.remove(&user);
            self.state.release(user);
            self.state.unregister(user);
        }
    }
}
