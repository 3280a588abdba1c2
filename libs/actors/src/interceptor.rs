//! Interceptor pipeline
//!
//! ```text
//! Broker ⇄ Proxy ⇄ I₁ ⇄ I₂ ⇄ … ⇄ Iₙ ⇄ Worker
//! ```
//!
//! Every stage has the same two-way contract, so a worker never knows how
//! many stages sit in front of it. Stages live on the worker's own task and
//! are invoked directly. A stage may swallow a message, rewrite it or emit
//! several. A failing stage stops its worker.

use std::any::type_name;

use tracing::error;
use types::Message;

use crate::error::WorkerError;

/// Messages a stage hands to the next one
#[derive(Debug, Default)]
pub struct Outlet {
    msgs: Vec<Message>,
}

impl Outlet {
    pub fn push(&mut self, msg: Message) {
        self.msgs.push(msg);
    }

    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }
}

pub trait Interceptor: Send + 'static {
    fn name(&self) -> &str {
        type_name::<Self>()
    }

    /// Called once when the chain is built for `worker`.
    fn attach(&mut self, worker: &str) {
        let _ = worker;
    }

    /// Message travelling from the worker towards the broker.
    fn on_msg_from_worker(&mut self, msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        out.push(msg);
        Ok(())
    }

    /// Message travelling from the broker towards the worker.
    fn on_msg_from_broker(&mut self, msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        out.push(msg);
        Ok(())
    }
}

/// Ordered stages, index 0 next to the proxy
#[derive(Default)]
pub struct InterceptorChain {
    stages: Vec<Box<dyn Interceptor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Outbound,
    Inbound,
}

impl InterceptorChain {
    pub fn new(stages: Vec<Box<dyn Interceptor>>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.stages.iter().map(|stage| stage.name().to_string()).collect()
    }

    pub(crate) fn insert_front(&mut self, stage: Box<dyn Interceptor>) {
        self.stages.insert(0, stage);
    }

    pub(crate) fn attach(&mut self, worker: &str) {
        for stage in &mut self.stages {
            stage.attach(worker);
        }
    }

    /// Run a worker's message through Iₙ … I₁.
    pub fn outbound(&mut self, msg: Message) -> Result<Vec<Message>, WorkerError> {
        run(self.stages.iter_mut().rev(), msg, Direction::Outbound)
    }

    /// Run a delivered message through I₁ … Iₙ.
    pub fn inbound(&mut self, msg: Message) -> Result<Vec<Message>, WorkerError> {
        run(self.stages.iter_mut(), msg, Direction::Inbound)
    }
}

fn run<'a>(
    stages: impl Iterator<Item = &'a mut Box<dyn Interceptor>>,
    msg: Message,
    direction: Direction,
) -> Result<Vec<Message>, WorkerError> {
    let mut batch = vec![msg];
    for stage in stages {
        let mut out = Outlet::default();
        for msg in batch {
            let result = match direction {
                Direction::Outbound => stage.on_msg_from_worker(msg, &mut out),
                Direction::Inbound => stage.on_msg_from_broker(msg, &mut out),
            };
            if let Err(source) = result {
                error!(stage = stage.name(), ?direction, error = %source, "Interceptor failed");
                return Err(WorkerError::StageFailed { stage: stage.name().to_string(), source });
            }
        }
        batch = out.msgs;
        if batch.is_empty() {
            break;
        }
    }
    Ok(batch)
}
