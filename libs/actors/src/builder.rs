//! Proxy construction and worker handles

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use router_config::WorkerSettings;
use tracing::{debug, error};
use types::WorkerId;

use crate::broker::Broker;
use crate::context::WorkerContext;
use crate::error::{BrokerError, WorkerError};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::interceptors::LoggingInterceptor;
use crate::mailbox::{Control, Delivery, Invoke, Mailbox};
use crate::proxy::{Proxy, ProxyShared};
use crate::runner::PendingWorker;
use crate::worker::Worker;

/// A configured worker waiting for its proxy
pub struct WorkerBuilder<W: Worker> {
    worker: W,
    settings: WorkerSettings,
}

impl<W: Worker> WorkerBuilder<W> {
    pub fn new(worker: W, settings: WorkerSettings) -> Self {
        Self { worker, settings }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Build `Proxy ⇄ I₁ ⇄ … ⇄ Iₙ ⇄ Worker`.
    ///
    /// A configured journal becomes the stage next to the proxy, so it
    /// records what actually leaves the worker.
    pub fn create_proxy(self, interceptors: Vec<Box<dyn Interceptor>>) -> Proxy<W> {
        let mut chain = InterceptorChain::new(interceptors);
        if let Some(journal) = self.settings.journal.clone() {
            chain.insert_front(Box::new(LoggingInterceptor::new(journal)));
        }
        chain.attach(&self.settings.name);

        let (mailbox, receiver) = Mailbox::new(self.settings.mailbox_capacity);
        let shared = Arc::new(ProxyShared::new(self.settings.name.clone(), mailbox));
        debug!(worker = %self.settings.name, interceptors = ?chain.names(), "Proxy created");
        Proxy {
            shared,
            settings: self.settings,
            pending: PendingWorker::new(self.worker, receiver, chain),
        }
    }

    /// Build the proxy from interceptors registered on the broker by name.
    ///
    /// Each registered interceptor serves exactly one worker.
    pub fn create_proxy_named<S: AsRef<str>>(self, broker: &Broker, names: &[S]) -> Result<Proxy<W>, BrokerError> {
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().map(AsRef::as_ref).find(|name| !seen.insert(*name)) {
            return Err(BrokerError::DuplicateInterceptor(dup.to_string()));
        }
        let stages = names
            .iter()
            .map(|name| broker.take_interceptor(name.as_ref(), &self.settings.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.create_proxy(stages))
    }
}

/// Handle for handing work back onto a worker's own context
pub struct WorkerHandle<W> {
    id: WorkerId,
    name: String,
    mailbox: Mailbox,
    _worker: PhantomData<fn() -> W>,
}

impl<W: Worker> WorkerHandle<W> {
    pub(crate) fn new(shared: &ProxyShared) -> Self {
        Self {
            id: shared.id(),
            name: shared.name().to_string(),
            mailbox: shared.mailbox().clone(),
            _worker: PhantomData,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` on the worker's task, after everything queued before it.
    pub fn post<F>(&self, f: F) -> Result<(), WorkerError>
    where
        F: FnOnce(&mut W, &mut WorkerContext) + Send + 'static,
    {
        let invoke: Invoke = Box::new(move |worker: &mut dyn Any, ctx: &mut WorkerContext| match worker.downcast_mut::<W>() {
            Some(worker) => f(worker, ctx),
            None => error!(worker = ctx.name(), "Posted closure does not match the worker type"),
        });
        if self.mailbox.deliver(Delivery::Invoke(invoke)) {
            Ok(())
        } else {
            Err(WorkerError::Stopped(self.name.clone()))
        }
    }

    /// Ask the worker to leave its message loop.
    pub fn stop(&self) -> bool {
        self.mailbox.signal(Control::Stop)
    }

    pub fn is_alive(&self) -> bool {
        !self.mailbox.is_closed()
    }
}

impl<W> Clone for WorkerHandle<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            mailbox: self.mailbox.clone(),
            _worker: PhantomData,
        }
    }
}

impl<W> fmt::Debug for WorkerHandle<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerHandle({}, {})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::NamespaceWrapper;
    use router_config::JournalSettings;
    use tracing_test::traced_test;

    struct Idle;
    impl Worker for Idle {}

    #[test]
    fn journal_sits_next_to_the_proxy() {
        let settings = WorkerSettings::named("idle").with_journal(JournalSettings::default());
        let proxy = WorkerBuilder::new(Idle, settings).create_proxy(vec![Box::new(NamespaceWrapper::new("ns"))]);
        assert_eq!(proxy.interceptor_names(), ["journal", "namespace_wrapper"]);
        assert_eq!(proxy.name(), "idle");
    }

    #[test]
    #[traced_test]
    fn named_interceptors_serve_one_worker() {
        let broker = Broker::default();
        broker.register_interceptor("wrap", Box::new(NamespaceWrapper::new("a"))).unwrap();

        let dup = WorkerBuilder::new(Idle, WorkerSettings::named("w0")).create_proxy_named(&broker, &["wrap", "wrap"]);
        assert!(matches!(dup, Err(BrokerError::DuplicateInterceptor(name)) if name == "wrap"));

        let first = WorkerBuilder::new(Idle, WorkerSettings::named("w1")).create_proxy_named(&broker, &["wrap"]);
        assert!(first.is_ok());

        let second = WorkerBuilder::new(Idle, WorkerSettings::named("w2")).create_proxy_named(&broker, &["wrap"]);
        assert!(matches!(second, Err(BrokerError::InterceptorReused(_))));
        assert!(logs_contain("Interceptor already in use"));

        let unknown = WorkerBuilder::new(Idle, WorkerSettings::named("w3")).create_proxy_named(&broker, &["nope"]);
        assert!(matches!(unknown, Err(BrokerError::UnknownInterceptor(_))));
    }

    #[test]
    fn handle_reports_a_gone_worker() {
        let proxy = WorkerBuilder::new(Idle, WorkerSettings::named("gone")).create_proxy(Vec::new());
        let handle: WorkerHandle<Idle> = WorkerHandle::new(&proxy.shared);
        assert!(handle.is_alive());
        drop(proxy);
        assert!(!handle.is_alive());
        assert!(matches!(handle.post(|_, _| {}), Err(WorkerError::Stopped(name)) if name == "gone"));
    }
}
