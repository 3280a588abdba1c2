//! Process-wide events
//!
//! Events bypass addressing and interceptor chains: the broker hands every
//! published event to every running worker except the publisher.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use types::{Payload, WorkerId};

#[derive(Clone)]
pub struct Event {
    sender: Option<WorkerId>,
    type_name: &'static str,
    body: Arc<dyn Any + Send + Sync>,
}

impl Event {
    pub fn new<T: Any + Send + Sync>(sender: Option<WorkerId>, body: T) -> Self {
        Self {
            sender,
            type_name: type_name::<T>(),
            body: Arc::new(body),
        }
    }

    pub fn sender(&self) -> Option<WorkerId> {
        self.sender
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.body.is::<T>()
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.body.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("sender", &self.sender)
            .field("type", &self.type_name)
            .finish()
    }
}

/// General purpose status event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerEvent {
    pub id: u32,
    pub status: i16,
    pub kind: i16,
    pub data: Payload,
}

impl BrokerEvent {
    pub fn new(id: u32, status: i16, kind: i16) -> Self {
        Self { id, status, kind, data: Payload::new() }
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }
}
