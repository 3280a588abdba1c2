//! Replies
//!
//! A reply type implements [`Reply`] for its behaviour and [`ReplyType`] for
//! its identity; [`ReplyMeta`] (tag, name, clone, `Any` view) is derived
//! automatically. "Is-a" relationships are expressed by composition: a
//! child embeds its parent and exposes it through [`Reply::ancestors`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::tag::{reply_tags, TypeRegistry, TypeTag};
use crate::error::ProtocolError;
use crate::payload::Payload;

/// Identity of a concrete reply type
pub trait ReplyType: Reply + Clone + Sized {
    const NAME: &'static str;
    const BUILTIN: Option<TypeTag> = None;

    /// Registered tag of this type.
    ///
    /// # Panics
    ///
    /// Panics when the user tag space is exhausted.
    fn type_tag() -> TypeTag {
        match TypeRegistry::replies().tag_for::<Self>(Self::NAME, Self::BUILTIN) {
            Ok(tag) => tag,
            Err(e) => panic!("{e}"),
        }
    }
}

/// Derived per-type plumbing of every [`Reply`]
pub trait ReplyMeta {
    fn tag(&self) -> TypeTag;
    fn type_name(&self) -> &'static str;
    fn clone_reply(&self) -> Box<dyn Reply>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: ReplyType> ReplyMeta for T {
    fn tag(&self) -> TypeTag {
        T::type_tag()
    }

    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn clone_reply(&self) -> Box<dyn Reply> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub trait Reply: ReplyMeta + Send + Sync + fmt::Debug + 'static {
    fn ok(&self) -> bool;

    fn reason(&self) -> Option<&str> {
        None
    }

    fn payload(&self) -> Option<&Payload> {
        None
    }

    /// Embedded parent views, nearest first.
    fn ancestors(&self) -> Vec<(TypeTag, &dyn Any)> {
        Vec::new()
    }

    /// Members of a reply pack.
    fn members(&self) -> Option<&[Arc<dyn Reply>]> {
        None
    }
}

impl dyn Reply + '_ {
    /// True when this reply is `tag` or inherits from it.
    pub fn is_tag(&self, tag: TypeTag) -> bool {
        self.tag() == tag || self.ancestors().iter().any(|(t, _)| *t == tag)
    }

    pub fn is<R: ReplyType>(&self) -> bool {
        self.is_tag(R::type_tag())
    }

    /// Exact type first, then the ancestor chain.
    pub fn downcast_ref<R: ReplyType>(&self) -> Option<&R> {
        let wanted = R::type_tag();
        if self.tag() == wanted {
            return self.as_any().downcast_ref::<R>();
        }
        self.ancestors()
            .into_iter()
            .find(|(tag, _)| *tag == wanted)
            .and_then(|(_, view)| view.downcast_ref::<R>())
    }

    pub fn is_pack(&self) -> bool {
        self.members().is_some()
    }
}

impl Clone for Box<dyn Reply> {
    fn clone(&self) -> Self {
        self.clone_reply()
    }
}

/// Reply with an ok flag and a human-readable reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyWithReason {
    ok: bool,
    reason: String,
}

impl ReplyWithReason {
    pub fn new(ok: bool, reason: impl Into<String>) -> Self {
        Self { ok, reason: reason.into() }
    }
}

impl Reply for ReplyWithReason {
    fn ok(&self) -> bool {
        self.ok
    }

    fn reason(&self) -> Option<&str> {
        Some(&self.reason)
    }
}

impl ReplyType for ReplyWithReason {
    const NAME: &'static str = "ReplyWithReason";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::WITH_REASON);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyOk;

impl Reply for ReplyOk {
    fn ok(&self) -> bool {
        true
    }
}

impl ReplyType for ReplyOk {
    const NAME: &'static str = "ReplyOk";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::OK);
}

/// Failure with a reason; is-a [`ReplyWithReason`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyFail {
    base: ReplyWithReason,
}

impl ReplyFail {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { base: ReplyWithReason::new(false, reason) }
    }
}

impl Reply for ReplyFail {
    fn ok(&self) -> bool {
        false
    }

    fn reason(&self) -> Option<&str> {
        self.base.reason()
    }

    fn ancestors(&self) -> Vec<(TypeTag, &dyn Any)> {
        vec![(ReplyWithReason::type_tag(), &self.base as &dyn Any)]
    }
}

impl ReplyType for ReplyFail {
    const NAME: &'static str = "ReplyFail";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::FAIL);
}

/// Payload-carrying reply, answer to a payload request
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPayload {
    ok: bool,
    payload: Payload,
}

impl ReplyPayload {
    pub fn success(payload: Payload) -> Self {
        Self { ok: true, payload }
    }

    pub fn failure(payload: Payload) -> Self {
        Self { ok: false, payload }
    }
}

impl Reply for ReplyPayload {
    fn ok(&self) -> bool {
        self.ok
    }

    fn payload(&self) -> Option<&Payload> {
        Some(&self.payload)
    }
}

impl ReplyType for ReplyPayload {
    const NAME: &'static str = "ReplyPayload";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::PAYLOAD);
}

/// Payload plus optional reason
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyWithPayload {
    ok: bool,
    payload: Payload,
    reason: Option<String>,
}

impl ReplyWithPayload {
    pub fn new(ok: bool, payload: Payload, reason: Option<String>) -> Self {
        Self { ok, payload, reason }
    }
}

impl Reply for ReplyWithPayload {
    fn ok(&self) -> bool {
        self.ok
    }

    fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    fn payload(&self) -> Option<&Payload> {
        Some(&self.payload)
    }
}

impl ReplyType for ReplyWithPayload {
    const NAME: &'static str = "ReplyWithPayload";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::WITH_PAYLOAD);
}

/// Successful [`ReplyWithPayload`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPayloadOk {
    base: ReplyWithPayload,
}

impl ReplyPayloadOk {
    pub fn new(payload: Payload) -> Self {
        Self { base: ReplyWithPayload::new(true, payload, None) }
    }
}

impl Reply for ReplyPayloadOk {
    fn ok(&self) -> bool {
        true
    }

    fn payload(&self) -> Option<&Payload> {
        self.base.payload()
    }

    fn ancestors(&self) -> Vec<(TypeTag, &dyn Any)> {
        vec![(ReplyWithPayload::type_tag(), &self.base as &dyn Any)]
    }
}

impl ReplyType for ReplyPayloadOk {
    const NAME: &'static str = "ReplyPayloadOk";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::PAYLOAD_OK);
}

/// Failed [`ReplyWithPayload`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyPayloadFail {
    base: ReplyWithPayload,
}

impl ReplyPayloadFail {
    pub fn new(payload: Payload, reason: impl Into<String>) -> Self {
        Self { base: ReplyWithPayload::new(false, payload, Some(reason.into())) }
    }
}

impl Reply for ReplyPayloadFail {
    fn ok(&self) -> bool {
        false
    }

    fn reason(&self) -> Option<&str> {
        self.base.reason()
    }

    fn payload(&self) -> Option<&Payload> {
        self.base.payload()
    }

    fn ancestors(&self) -> Vec<(TypeTag, &dyn Any)> {
        vec![(ReplyWithPayload::type_tag(), &self.base as &dyn Any)]
    }
}

impl ReplyType for ReplyPayloadFail {
    const NAME: &'static str = "ReplyPayloadFail";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::PAYLOAD_FAIL);
}

/// Ordered replies to a command pack; ok only when every member is ok
#[derive(Debug, Clone, Default)]
pub struct ReplyPack {
    replies: Vec<Arc<dyn Reply>>,
}

impl ReplyPack {
    pub fn new(replies: Vec<Arc<dyn Reply>>) -> Result<Self, ProtocolError> {
        let mut pack = Self::default();
        for reply in replies {
            pack.push(reply)?;
        }
        Ok(pack)
    }

    pub fn push(&mut self, reply: Arc<dyn Reply>) -> Result<(), ProtocolError> {
        if reply.is_pack() {
            return Err(ProtocolError::NestedPack { pack: Self::NAME });
        }
        self.replies.push(reply);
        Ok(())
    }

    pub fn replies(&self) -> &[Arc<dyn Reply>] {
        &self.replies
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }
}

impl Reply for ReplyPack {
    fn ok(&self) -> bool {
        self.replies.iter().all(|reply| reply.ok())
    }

    fn members(&self) -> Option<&[Arc<dyn Reply>]> {
        Some(&self.replies)
    }
}

impl ReplyType for ReplyPack {
    const NAME: &'static str = "ReplyPack";
    const BUILTIN: Option<TypeTag> = Some(reply_tags::PACK);
}
