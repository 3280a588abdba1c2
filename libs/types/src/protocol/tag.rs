//! Runtime type tags and the open type registry
//!
//! Builtin types carry pre-assigned tags. User types draw a tag lazily, the
//! first time their tag is requested, from the range starting at
//! [`TypeTag::USER_START`]. Commands and replies use separate registries so
//! their tag spaces are independent.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeTag(u32);

impl TypeTag {
    pub const NONE: TypeTag = TypeTag(0);
    pub const PACK: TypeTag = TypeTag(100);
    pub const USER_START: TypeTag = TypeTag(500);
    pub const USER_MAX: TypeTag = TypeTag(u32::MAX);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    pub fn is_user(&self) -> bool {
        *self >= Self::USER_START
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pre-assigned command tags
pub mod command_tags {
    use super::TypeTag;

    pub const NONE: TypeTag = TypeTag::NONE;
    pub const ACKNOWLEDGE: TypeTag = TypeTag::new(1);
    pub const REQUEST_PAYLOAD: TypeTag = TypeTag::new(2);
    pub const DUMMY: TypeTag = TypeTag::new(3);
    pub const TRIGGER: TypeTag = TypeTag::new(4);
    pub const PACK: TypeTag = TypeTag::PACK;
}

/// Pre-assigned reply tags
pub mod reply_tags {
    use super::TypeTag;

    pub const NONE: TypeTag = TypeTag::NONE;
    pub const WITH_REASON: TypeTag = TypeTag::new(1);
    pub const OK: TypeTag = TypeTag::new(2);
    pub const FAIL: TypeTag = TypeTag::new(3);
    pub const PAYLOAD: TypeTag = TypeTag::new(4);
    pub const WITH_PAYLOAD: TypeTag = TypeTag::new(5);
    pub const PAYLOAD_OK: TypeTag = TypeTag::new(6);
    pub const PAYLOAD_FAIL: TypeTag = TypeTag::new(7);
    pub const PACK: TypeTag = TypeTag::PACK;
}

static COMMANDS: Lazy<TypeRegistry> = Lazy::new(|| TypeRegistry::new("command"));
static REPLIES: Lazy<TypeRegistry> = Lazy::new(|| TypeRegistry::new("reply"));

/// Type → tag table with a lazily allocated user range
#[derive(Debug)]
pub struct TypeRegistry {
    family: &'static str,
    by_type: DashMap<TypeId, TypeTag>,
    names: DashMap<TypeTag, &'static str>,
    next_user: AtomicU32,
    limit: u32,
}

impl TypeRegistry {
    pub fn new(family: &'static str) -> Self {
        Self::with_user_range(family, TypeTag::USER_START.get(), TypeTag::USER_MAX.get())
    }

    /// Registry whose user tags are drawn from `start..limit`.
    pub fn with_user_range(family: &'static str, start: u32, limit: u32) -> Self {
        Self {
            family,
            by_type: DashMap::new(),
            names: DashMap::new(),
            next_user: AtomicU32::new(start),
            limit,
        }
    }

    pub fn commands() -> &'static TypeRegistry {
        &COMMANDS
    }

    pub fn replies() -> &'static TypeRegistry {
        &REPLIES
    }

    /// Tag of `T`, registering it on first use.
    pub fn tag_for<T: 'static>(
        &self,
        name: &'static str,
        builtin: Option<TypeTag>,
    ) -> Result<TypeTag, ProtocolError> {
        if let Some(tag) = self.by_type.get(&TypeId::of::<T>()) {
            return Ok(*tag);
        }

        let tag = *self
            .by_type
            .entry(TypeId::of::<T>())
            .or_try_insert_with(|| match builtin {
                Some(tag) => Ok(tag),
                None => self.allocate_user(name),
            })?;

        self.names.entry(tag).or_insert(name);
        debug!(family = self.family, type_name = name, tag = %tag, "Registered protocol type");
        Ok(tag)
    }

    fn allocate_user(&self, name: &'static str) -> Result<TypeTag, ProtocolError> {
        let limit = self.limit;
        self.next_user
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < limit).then_some(next + 1)
            })
            .map(TypeTag)
            .map_err(|_| ProtocolError::TagSpaceExhausted { type_name: name, limit })
    }

    pub fn name_of(&self, tag: TypeTag) -> Option<&'static str> {
        self.names.get(&tag).map(|name| *name)
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}
