//! Router-facing side of a worker
//!
//! [`ProxyShared`] is what the broker and peer workers hold: the worker's
//! identity, its mailbox and its lifecycle flags. Peers keep it through
//! [`PeerRef`], a weak reference, so an edge never keeps a stopped worker
//! alive.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use router_config::WorkerSettings;
use tracing::{debug, warn};
use types::{ContextId, Message, WorkerId};

use crate::mailbox::{Control, Delivery, Mailbox};
use crate::runner::PendingWorker;
use crate::worker::Worker;

pub struct ProxyShared {
    name: String,
    id: WorkerId,
    context: ContextId,
    mailbox: Mailbox,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ProxyShared {
    pub(crate) fn new(name: String, mailbox: Mailbox) -> Self {
        Self {
            name,
            id: WorkerId::new(),
            context: ContextId::fresh(),
            mailbox,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Execution context the worker runs on.
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Returns the previous value, so only the first caller sees `false`.
    pub(crate) fn mark_started(&self) -> bool {
        self.started.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Inbound filter, then enqueue.
    ///
    /// Invalid messages are dropped. Broadcasts are always taken, direct
    /// messages only when this worker is among the receivers.
    pub fn offer(&self, msg: Message) -> bool {
        if !msg.is_valid() {
            warn!(
                worker = %self.name,
                msg_id = %msg.id(),
                reason = msg.bad_reason().unwrap_or("Not given"),
                "Dropping bad message"
            );
            return false;
        }
        if msg.is_direct() && !msg.is_broadcast() && !msg.is_addressed_to(self.id) {
            return false;
        }
        self.deliver(Delivery::Message(msg))
    }

    pub(crate) fn deliver(&self, delivery: Delivery) -> bool {
        if self.mailbox.deliver(delivery) {
            return true;
        }
        debug!(worker = %self.name, "Delivery to a stopped worker discarded");
        false
    }

    pub(crate) fn stop(&self) -> bool {
        self.mailbox.signal(Control::Stop)
    }
}

impl fmt::Debug for ProxyShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyShared")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("started", &self.is_started())
            .finish()
    }
}

/// Weak producer/consumer edge endpoint
#[derive(Clone)]
pub struct PeerRef {
    id: WorkerId,
    name: String,
    proxy: Weak<ProxyShared>,
}

impl PeerRef {
    pub fn new(proxy: &Arc<ProxyShared>) -> Self {
        Self {
            id: proxy.id(),
            name: proxy.name().to_string(),
            proxy: Arc::downgrade(proxy),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upgrade(&self) -> Option<Arc<ProxyShared>> {
        self.proxy.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.proxy.strong_count() > 0
    }
}

impl fmt::Debug for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}

/// A worker ready for registration: its router-facing side and the parts
/// that move onto its task when it starts.
pub struct Proxy<W: Worker> {
    pub(crate) shared: Arc<ProxyShared>,
    pub(crate) settings: WorkerSettings,
    pub(crate) pending: PendingWorker<W>,
}

impl<W: Worker> Proxy<W> {
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id()
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn interceptor_names(&self) -> Vec<String> {
        self.pending.chain.names()
    }
}
