//! Worker mailbox
//!
//! Two lanes, read with a biased select: a bounded control lane for
//! lifecycle signals and an unbounded lane for everything else. The
//! unbounded lane is a single FIFO queue, so deliveries from one sender
//! arrive in the order they were sent.

use std::any::Any;
use std::fmt;

use tokio::sync::mpsc;
use types::{Message, WorkerId};

use crate::context::WorkerContext;
use crate::events::Event;
use crate::proxy::PeerRef;

/// Closure executed on the worker's own task
pub type Invoke = Box<dyn FnOnce(&mut dyn Any, &mut WorkerContext) + Send>;

#[derive(Debug, Clone)]
pub enum LinkChange {
    AddConsumer(PeerRef),
    AddProducer(PeerRef),
    DropConsumer(WorkerId),
    DropProducer(WorkerId),
    /// The peer left the router; forget every edge to it.
    Remove(WorkerId),
}

pub enum Delivery {
    Message(Message),
    Event(Event),
    Invoke(Invoke),
    Link(LinkChange),
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "Message({msg})"),
            Self::Event(event) => write!(f, "Event({})", event.type_name()),
            Self::Invoke(_) => f.write_str("Invoke"),
            Self::Link(change) => write!(f, "Link({change:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Stop,
}

#[derive(Debug, Clone)]
pub struct Mailbox {
    control: mpsc::Sender<Control>,
    normal: mpsc::UnboundedSender<Delivery>,
}

pub struct MailboxReceiver {
    control: mpsc::Receiver<Control>,
    normal: mpsc::UnboundedReceiver<Delivery>,
}

pub enum Received {
    Control(Control),
    Delivery(Delivery),
}

impl Mailbox {
    pub fn new(control_capacity: usize) -> (Self, MailboxReceiver) {
        let (control_tx, control_rx) = mpsc::channel(control_capacity.max(1));
        let (normal_tx, normal_rx) = mpsc::unbounded_channel();
        (
            Self { control: control_tx, normal: normal_tx },
            MailboxReceiver { control: control_rx, normal: normal_rx },
        )
    }

    /// Queue a delivery; `false` once the worker is gone.
    pub fn deliver(&self, delivery: Delivery) -> bool {
        self.normal.send(delivery).is_ok()
    }

    /// Queue a control signal without waiting; `false` when the lane is
    /// full or closed.
    pub fn signal(&self, control: Control) -> bool {
        self.control.try_send(control).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.normal.is_closed()
    }
}

impl MailboxReceiver {
    pub async fn recv(&mut self) -> Option<Received> {
        tokio::select! {
            biased;

            Some(control) = self.control.recv() => Some(Received::Control(control)),
            delivery = self.normal.recv() => delivery.map(Received::Delivery),
        }
    }

    /// Next queued delivery without waiting, used when draining on stop.
    pub fn try_next(&mut self) -> Option<Delivery> {
        self.normal.try_recv().ok()
    }
}
