use anyhow::Context as _;
use tracing::debug;
use types::{Message, Payload};

use crate::interceptor::{Interceptor, Outlet};

/// Nests the outgoing payload under a key path.
#[derive(Debug, Clone)]
pub struct NamespaceWrapper {
    namespace: String,
}

impl NamespaceWrapper {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }
}

impl Interceptor for NamespaceWrapper {
    fn name(&self) -> &str {
        "namespace_wrapper"
    }

    fn on_msg_from_worker(&mut self, mut msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        let inner = msg.take_payload();
        if inner.is_empty() {
            debug!(namespace = %self.namespace, msg_id = %msg.id(), "Empty payload not wrapped");
            out.push(msg);
            return Ok(());
        }
        let mut wrapped = Payload::new();
        wrapped
            .set(&self.namespace, inner.into_value())
            .with_context(|| format!("cannot wrap payload into {}", self.namespace))?;
        msg.set_payload(wrapped);
        out.push(msg);
        Ok(())
    }
}

/// Replaces the outgoing payload with what sits under a key path.
/// Messages left empty are dropped.
#[derive(Debug, Clone)]
pub struct NamespaceUnwrapper {
    namespace: String,
}

impl NamespaceUnwrapper {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }
}

impl Interceptor for NamespaceUnwrapper {
    fn name(&self) -> &str {
        "namespace_unwrapper"
    }

    fn on_msg_from_worker(&mut self, mut msg: Message, out: &mut Outlet) -> anyhow::Result<()> {
        let inner = msg
            .payload_mut()
            .remove(&self.namespace)
            .map(Payload::from_value)
            .unwrap_or_default();
        if inner.is_empty() {
            debug!(namespace = %self.namespace, msg_id = %msg.id(), "Nothing to unwrap, message dropped");
            return Ok(());
        }
        msg.set_payload(inner);
        out.push(msg);
        Ok(())
    }
}
