//! Error types for the router
//!
//! [`BrokerError`] covers wiring and lifecycle misuse, raised at the call
//! site and never retried. [`WorkerError`] is what a worker's handlers and
//! pipeline report while running.

use async_context::ContextError;
use types::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("worker name may not be empty")]
    EmptyName,

    #[error("a worker named {0} is already registered")]
    DuplicateName(String),

    #[error("producers and consumers are already wired; the wiring pass runs once")]
    AlreadyWired,

    #[error("worker {name}, wanted by {wanted_by}, is not registered")]
    MissingWorker { name: String, wanted_by: String },

    #[error("worker {0} cannot be its own consumer")]
    SelfConnect(String),

    #[error("{producer} is already connected to {consumer}")]
    DuplicateConnection { producer: String, consumer: String },

    #[error("{producer} is not connected to {consumer}")]
    NotConnected { producer: String, consumer: String },

    #[error("worker {0} did not start")]
    NotStarted(String),

    #[error("worker {0} is already running")]
    AlreadyRunning(String),

    #[error("interceptor {0} is already used by another worker; sharing it will result in msg loops")]
    InterceptorReused(String),

    #[error("interceptor {0} appears twice in one chain")]
    DuplicateInterceptor(String),

    #[error("no interceptor registered as {0}")]
    UnknownInterceptor(String),

    #[error("an interceptor named {0} is already registered")]
    InterceptorExists(String),

    #[error("no tokio runtime to run worker {0} on")]
    NoRuntime(String),
}

impl BrokerError {
    pub fn missing(name: impl Into<String>, wanted_by: impl Into<String>) -> Self {
        Self::MissingWorker { name: name.into(), wanted_by: wanted_by.into() }
    }

    /// Misuse that must abort startup rather than be logged and skipped.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotConnected { .. } | Self::UnknownInterceptor(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{worker} has no handler for {category}")]
    Unhandled { worker: String, category: &'static str },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("interceptor {stage} failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("worker {0} is not running")]
    NotStarted(String),

    #[error("worker {0} has stopped")]
    Stopped(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("{0}")]
    Other(String),
}

impl WorkerError {
    pub fn unhandled(worker: &str, category: &'static str) -> Self {
        Self::Unhandled { worker: worker.to_string(), category }
    }

    pub fn other(reason: impl ToString) -> Self {
        Self::Other(reason.to_string())
    }

    /// Errors after which the worker cannot keep running.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StageFailed { .. } | Self::Stopped(_))
    }
}
