//! Worker runtime and broker for the Switchyard router
//!
//! Workers are actors with one execution context each. They sit behind a
//! proxy and an optional interceptor chain, and exchange [`Message`]s
//! through a central [`Broker`].
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!                 │                 Broker                   │
//!                 │  names · edges · interceptors · tasks    │
//!                 └───────┬──────────────────────────┬───────┘
//!                         │ fan_out / publish        │
//!                 ┌───────▼───────┐          ┌───────▼───────┐
//!                 │    Proxy A    │ ───────▶ │    Proxy B    │  linked peers:
//!                 │ mailbox+flags │  direct  │ mailbox+flags │  direct enqueue
//!                 └───────┬───────┘          └───────┬───────┘
//!                    I₁ … Iₙ                    I₁ … Iₙ
//!                 ┌───────▼───────┐          ┌───────▼───────┐
//!                 │ Worker A task │          │ Worker B task │
//!                 └───────────────┘          └───────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use messaging_actors::{Broker, Worker, WorkerContext, WorkerError};
//! use router_config::WorkerSettings;
//! use types::Message;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl Worker for Printer {
//!     async fn on_msg(&mut self, ctx: &mut WorkerContext, msg: Message) -> Result<(), WorkerError> {
//!         tracing::info!(worker = ctx.name(), payload = %msg.payload(), "Got a message");
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Broker::default();
//! broker.spawn(Printer, WorkerSettings::named("printer"))?;
//! broker.connect_producers_and_consumers()?;
//! broker.run_all()?;
//! broker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod builder;
pub mod context;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod interceptors;
pub mod mailbox;
pub mod proxy;
pub mod repeater;
mod runner;
pub mod worker;

pub use broker::Broker;
pub use builder::{WorkerBuilder, WorkerHandle};
pub use context::WorkerContext;
pub use error::{BrokerError, WorkerError};
pub use events::{BrokerEvent, Event};
pub use interceptor::{Interceptor, InterceptorChain, Outlet};
pub use interceptors::{LoggingInterceptor, NamespaceUnwrapper, NamespaceWrapper, RenamingInterceptor};
pub use proxy::{PeerRef, Proxy, ProxyShared};
pub use repeater::Repeater;
pub use worker::{Directive, Worker};

pub use types::Message;
