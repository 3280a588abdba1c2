//! Identities
//!
//! Worker identities are random UUIDs so they never collide across
//! brokers. Message and execution-context identifiers are process-wide
//! monotonic counters and are never reused.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_CONTEXT: ContextId;
}

/// Unique worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let simple = self.0.simple().to_string();
        write!(f, "worker-{}", &simple[..8])
    }
}

/// Message identifier, strictly increasing in allocation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(u64);

impl MessageId {
    /// Allocate the next id. Ids start at 1.
    pub fn next() -> Self {
        Self(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one execution context.
///
/// Each worker runs its whole lifetime inside [`ContextId::scope`], so code
/// running on that worker's task can ask [`ContextId::current`] which
/// context it is on. Async completions compare this marker with the one
/// captured at request time before touching worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn fresh() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Context of the calling task, `None` outside any worker.
    pub fn current() -> Option<ContextId> {
        CURRENT_CONTEXT.try_with(|id| *id).ok()
    }

    /// True when the caller runs on this context.
    pub fn is_current(&self) -> bool {
        Self::current() == Some(*self)
    }

    /// Run `fut` with this context installed as the current one.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_CONTEXT.scope(self, fut).await
    }

    /// Synchronous variant of [`ContextId::scope`].
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT_CONTEXT.sync_scope(self, f)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Name lookup used when addressing messages by worker name
pub trait NameResolver {
    fn resolve(&self, name: &str) -> Option<WorkerId>;
    fn name_of(&self, id: WorkerId) -> Option<String>;
}
