//! Process-wide registry and router
//!
//! One [`Broker`] is created at startup and cloned into every worker. It
//! knows every registered proxy by name, holds the producer/consumer edges
//! and the named interceptors, and starts workers on the current tokio
//! runtime.
//!
//! The registry sits behind a single re-entrant lock, so registry methods
//! may call each other. No `RefCell` borrow is held across such a call and
//! the lock is never held across an `.await`.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use router_config::{BrokerSettings, WorkerSettings};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{Message, NameResolver, WorkerId};

use crate::builder::{WorkerBuilder, WorkerHandle};
use crate::error::BrokerError;
use crate::events::Event;
use crate::interceptor::Interceptor;
use crate::mailbox::{Delivery, LinkChange};
use crate::proxy::{PeerRef, Proxy, ProxyShared};
use crate::runner::{Launch, LaunchSetup};
use crate::worker::Worker;

struct Entry {
    shared: Arc<ProxyShared>,
    settings: WorkerSettings,
    pending: Option<Box<dyn Launch>>,
}

enum Slot {
    Free(Box<dyn Interceptor>),
    Taken { by: String },
}

#[derive(Default)]
struct Registry {
    workers: BTreeMap<String, Entry>,
    names: HashMap<WorkerId, String>,
    /// (producer, consumer)
    connections: BTreeSet<(String, String)>,
    wired: bool,
    interceptors: BTreeMap<String, Slot>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Registry {
    fn shared(&self, name: &str) -> Option<Arc<ProxyShared>> {
        self.workers.get(name).map(|e| e.shared.clone())
    }

    fn peers(&self, name: &str) -> (Vec<PeerRef>, Vec<PeerRef>) {
        let mut consumers = Vec::new();
        let mut producers = Vec::new();
        for (producer, consumer) in &self.connections {
            if producer == name {
                if let Some(entry) = self.workers.get(consumer) {
                    consumers.push(PeerRef::new(&entry.shared));
                }
            }
            if consumer == name {
                if let Some(entry) = self.workers.get(producer) {
                    producers.push(PeerRef::new(&entry.shared));
                }
            }
        }
        (consumers, producers)
    }
}

struct BrokerInner {
    settings: BrokerSettings,
    registry: ReentrantMutex<RefCell<Registry>>,
}

#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(BrokerSettings::default())
    }
}

impl Broker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                settings,
                registry: ReentrantMutex::new(RefCell::new(Registry::default())),
            }),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.inner.settings
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let guard = self.inner.registry.lock();
        let mut registry = guard.borrow_mut();
        f(&mut registry)
    }

    /// Make a proxy known under its worker's name.
    pub fn register_proxy<W: Worker>(&self, proxy: Proxy<W>) -> Result<WorkerHandle<W>, BrokerError> {
        let name = proxy.name().to_string();
        if name.is_empty() {
            return Err(BrokerError::EmptyName);
        }
        let handle = WorkerHandle::new(&proxy.shared);
        let Proxy { shared, settings, pending } = proxy;
        self.with_registry(|reg| {
            if reg.workers.contains_key(&name) {
                return Err(BrokerError::DuplicateName(name.clone()));
            }
            reg.names.insert(shared.id(), name.clone());
            reg.workers.insert(
                name.clone(),
                Entry {
                    shared,
                    settings,
                    pending: Some(Box::new(pending)),
                },
            );
            Ok(())
        })?;
        info!(worker = %name, id = %handle.id(), "Worker registered");
        Ok(handle)
    }

    /// Build a proxy without interceptors and register it.
    pub fn spawn<W: Worker>(&self, worker: W, settings: WorkerSettings) -> Result<WorkerHandle<W>, BrokerError> {
        self.register_proxy(WorkerBuilder::new(worker, settings).create_proxy(Vec::new()))
    }

    pub fn register_interceptor(&self, name: &str, interceptor: Box<dyn Interceptor>) -> Result<(), BrokerError> {
        self.with_registry(|reg| {
            if reg.interceptors.contains_key(name) {
                return Err(BrokerError::InterceptorExists(name.to_string()));
            }
            reg.interceptors.insert(name.to_string(), Slot::Free(interceptor));
            Ok(())
        })
    }

    /// Hand a registered interceptor to the worker `by`. Each one can be
    /// taken once.
    pub fn take_interceptor(&self, name: &str, by: &str) -> Result<Box<dyn Interceptor>, BrokerError> {
        self.with_registry(|reg| {
            let slot = reg
                .interceptors
                .get_mut(name)
                .ok_or_else(|| BrokerError::UnknownInterceptor(name.to_string()))?;
            match std::mem::replace(slot, Slot::Taken { by: by.to_string() }) {
                Slot::Free(stage) => Ok(stage),
                Slot::Taken { by: owner } => {
                    warn!(interceptor = name, owner = %owner, wanted_by = by, "Interceptor already in use");
                    *slot = Slot::Taken { by: owner };
                    Err(BrokerError::InterceptorReused(name.to_string()))
                }
            }
        })
    }

    /// Single global pass creating every declared producer/consumer edge.
    pub fn connect_producers_and_consumers(&self) -> Result<usize, BrokerError> {
        let guard = self.inner.registry.lock();
        let edges = {
            let mut reg = guard.borrow_mut();
            if reg.wired {
                return Err(BrokerError::AlreadyWired);
            }
            reg.wired = true;

            let mut edges = BTreeSet::new();
            for (name, entry) in &reg.workers {
                for consumer in &entry.settings.consumers {
                    edges.insert((name.clone(), consumer.clone()));
                }
                for producer in &entry.settings.producers {
                    edges.insert((producer.clone(), name.clone()));
                }
            }
            edges
        };

        let mut added = 0;
        for (producer, consumer) in &edges {
            if self.ensure_edge(producer, consumer)? {
                added += 1;
            }
        }
        info!(declared = edges.len(), added, "Producers and consumers wired");
        Ok(added)
    }

    /// Declared edge: checked against the settings, then linked. `false`
    /// when skipped or already present.
    fn ensure_edge(&self, producer: &str, consumer: &str) -> Result<bool, BrokerError> {
        let settings = self.settings();
        if producer == consumer && !settings.allow_self_connect {
            return Err(BrokerError::SelfConnect(producer.to_string()));
        }
        for (name, other) in [(producer, consumer), (consumer, producer)] {
            if !self.exists(name) {
                if settings.allow_external_refs {
                    debug!(worker = name, wanted_by = other, "External reference not registered yet");
                    return Ok(false);
                }
                return Err(BrokerError::missing(name, other));
            }
        }
        self.link(producer, consumer)
    }

    fn link(&self, producer: &str, consumer: &str) -> Result<bool, BrokerError> {
        let linked = self.with_registry(|reg| {
            let p = reg.shared(producer).ok_or_else(|| BrokerError::missing(producer, consumer))?;
            let c = reg.shared(consumer).ok_or_else(|| BrokerError::missing(consumer, producer))?;
            let added = reg.connections.insert((producer.to_string(), consumer.to_string()));
            Ok::<_, BrokerError>(added.then_some((p, c)))
        })?;
        let Some((p, c)) = linked else {
            return Ok(false);
        };

        if p.is_started() {
            p.deliver(Delivery::Link(LinkChange::AddConsumer(PeerRef::new(&c))));
        }
        if c.is_started() {
            c.deliver(Delivery::Link(LinkChange::AddProducer(PeerRef::new(&p))));
        }
        debug!(producer, consumer, "Connected");
        Ok(true)
    }

    /// Explicit edge outside the configured wiring.
    pub fn connect_two(&self, producer: &str, consumer: &str) -> Result<(), BrokerError> {
        if producer == consumer && !self.settings().allow_self_connect {
            return Err(BrokerError::SelfConnect(producer.to_string()));
        }
        if self.link(producer, consumer)? {
            Ok(())
        } else {
            Err(BrokerError::DuplicateConnection {
                producer: producer.to_string(),
                consumer: consumer.to_string(),
            })
        }
    }

    pub fn disconnect(&self, producer: &str, consumer: &str) -> Result<(), BrokerError> {
        let peers = self.with_registry(|reg| {
            if !reg.connections.remove(&(producer.to_string(), consumer.to_string())) {
                return None;
            }
            Some((reg.shared(producer), reg.shared(consumer)))
        });
        let Some((p, c)) = peers else {
            return Err(BrokerError::NotConnected {
                producer: producer.to_string(),
                consumer: consumer.to_string(),
            });
        };
        if let (Some(p), Some(c)) = (&p, &c) {
            if p.is_started() {
                p.deliver(Delivery::Link(LinkChange::DropConsumer(c.id())));
            }
            if c.is_started() {
                c.deliver(Delivery::Link(LinkChange::DropProducer(p.id())));
            }
        }
        debug!(producer, consumer, "Disconnected");
        Ok(())
    }

    pub fn are_connected(&self, producer: &str, consumer: &str) -> bool {
        self.with_registry(|reg| reg.connections.contains(&(producer.to_string(), consumer.to_string())))
    }

    /// Start one worker on the current runtime. Declared producers and
    /// consumers are resolved first; a worker runs once.
    pub fn run_worker(&self, name: &str) -> Result<(), BrokerError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| BrokerError::NoRuntime(name.to_string()))?;

        let guard = self.inner.registry.lock();
        let (shared, settings) = {
            let reg = guard.borrow();
            let entry = reg.workers.get(name).ok_or_else(|| BrokerError::missing(name, "run_worker"))?;
            if entry.shared.is_started() {
                return Err(BrokerError::AlreadyRunning(name.to_string()));
            }
            (entry.shared.clone(), entry.settings.clone())
        };

        for consumer in &settings.consumers {
            self.ensure_edge(name, consumer)?;
        }
        for producer in &settings.producers {
            self.ensure_edge(producer, name)?;
        }

        let (pending, consumers, producers) = {
            let mut reg = guard.borrow_mut();
            let (consumers, producers) = reg.peers(name);
            let pending = reg.workers.get_mut(name).and_then(|e| e.pending.take());
            (pending, consumers, producers)
        };
        let Some(pending) = pending else {
            return Err(BrokerError::AlreadyRunning(name.to_string()));
        };
        if shared.mark_started() {
            return Err(BrokerError::AlreadyRunning(name.to_string()));
        }

        info!(worker = name, consumers = consumers.len(), producers = producers.len(), "Starting worker");
        let task = pending.launch(LaunchSetup {
            broker: self.clone(),
            shared,
            settings,
            consumers,
            producers,
            runtime,
        });
        guard.borrow_mut().tasks.push((name.to_string(), task));
        Ok(())
    }

    /// Start every worker not started yet, then check that all of them
    /// are running.
    pub fn run_all(&self) -> Result<usize, BrokerError> {
        let guard = self.inner.registry.lock();
        let waiting: Vec<String> = guard
            .borrow()
            .workers
            .iter()
            .filter(|(_, e)| !e.shared.is_started())
            .map(|(name, _)| name.clone())
            .collect();
        for name in &waiting {
            self.run_worker(name)?;
        }

        let laggard = guard
            .borrow()
            .workers
            .iter()
            .find(|(_, e)| !e.shared.is_started())
            .map(|(name, _)| name.clone());
        if let Some(name) = laggard {
            return Err(BrokerError::NotStarted(name));
        }
        info!(started = waiting.len(), "All workers running");
        Ok(waiting.len())
    }

    /// Offer `msg` to every registered proxy except `except`. Each proxy
    /// applies its own filter. Returns how many accepted it.
    pub fn fan_out(&self, msg: Message, except: Option<WorkerId>) -> usize {
        let targets: Vec<Arc<ProxyShared>> = self.with_registry(|reg| {
            reg.workers
                .values()
                .filter(|e| Some(e.shared.id()) != except)
                .map(|e| e.shared.clone())
                .collect()
        });
        let direct = msg.is_direct() && !msg.is_broadcast();
        let msg_id = msg.id();
        let delivered = targets.iter().filter(|t| t.offer(msg.clone())).count();
        if direct && delivered < msg.receivers().len() {
            warn!(%msg_id, receivers = msg.receivers().len(), delivered, "Direct message not delivered to every receiver");
        }
        delivered
    }

    /// Hand `event` to every running worker except its publisher.
    pub fn publish(&self, event: Event) -> usize {
        let targets: Vec<Arc<ProxyShared>> = self.with_registry(|reg| {
            reg.workers
                .values()
                .filter(|e| e.shared.is_started() && Some(e.shared.id()) != event.sender())
                .map(|e| e.shared.clone())
                .collect()
        });
        let delivered = targets.iter().filter(|t| t.deliver(Delivery::Event(event.clone()))).count();
        debug!(event = event.type_name(), delivered, "Event published");
        delivered
    }

    pub fn exists(&self, name: &str) -> bool {
        self.with_registry(|reg| reg.workers.contains_key(name))
    }

    pub fn worker_names(&self) -> Vec<String> {
        self.with_registry(|reg| reg.workers.keys().cloned().collect())
    }

    pub fn was_started(&self, name: &str) -> bool {
        self.with_registry(|reg| reg.workers.get(name).is_some_and(|e| e.shared.is_started()))
    }

    /// Ask one worker to stop; `false` when unknown or already gone.
    pub fn stop(&self, name: &str) -> bool {
        self.with_registry(|reg| reg.shared(name)).is_some_and(|shared| shared.stop())
    }

    /// Forget a stopped worker and every edge touching it.
    pub(crate) fn unregister(&self, id: WorkerId) {
        let removed = self.with_registry(|reg| {
            let name = reg.names.remove(&id)?;
            reg.workers.remove(&name);
            let mut peers = Vec::new();
            reg.connections.retain(|(producer, consumer)| {
                if producer == &name {
                    peers.push(consumer.clone());
                    false
                } else if consumer == &name {
                    peers.push(producer.clone());
                    false
                } else {
                    true
                }
            });
            let peers: Vec<Arc<ProxyShared>> = peers.iter().filter_map(|p| reg.shared(p)).collect();
            Some((name, peers))
        });
        let Some((name, peers)) = removed else {
            return;
        };
        for peer in peers.iter().filter(|p| p.is_started()) {
            peer.deliver(Delivery::Link(LinkChange::Remove(id)));
        }
        info!(worker = %name, "Worker unregistered");
    }

    /// Stop every worker and wait for their tasks.
    pub async fn shutdown(&self) {
        let tasks = {
            let guard = self.inner.registry.lock();
            let mut reg = guard.borrow_mut();
            for entry in reg.workers.values() {
                entry.shared.stop();
            }
            std::mem::take(&mut reg.tasks)
        };
        info!(workers = tasks.len(), "Shutting down broker");

        let (names, handles): (Vec<String>, Vec<JoinHandle<()>>) = tasks.into_iter().unzip();
        for (name, result) in names.iter().zip(futures::future::join_all(handles).await) {
            if let Err(e) = result {
                warn!(worker = %name, error = %e, "Worker task ended abnormally");
            }
        }
        info!("Broker shutdown complete");
    }
}

impl NameResolver for Broker {
    fn resolve(&self, name: &str) -> Option<WorkerId> {
        self.with_registry(|reg| reg.workers.get(name).map(|e| e.shared.id()))
    }

    fn name_of(&self, id: WorkerId) -> Option<String> {
        self.with_registry(|reg| reg.names.get(&id).cloned())
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("settings", &self.inner.settings)
            .field("workers", &self.worker_names())
            .finish()
    }
}
