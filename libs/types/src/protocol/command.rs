//! Commands
//!
//! Every command statically pins the reply type it expects through
//! [`CommandType::WantedReply`]. `reply_ok` holds when the received reply
//! is, or inherits from, that type and reports success.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::reply::{Reply, ReplyOk, ReplyPack, ReplyPayload, ReplyType};
use super::tag::{command_tags, TypeRegistry, TypeTag};
use crate::error::ProtocolError;
use crate::payload::Payload;

/// Identity of a concrete command type
pub trait CommandType: Command + Clone + Sized {
    const NAME: &'static str;
    const BUILTIN: Option<TypeTag> = None;

    type WantedReply: ReplyType;

    /// Registered tag of this type.
    ///
    /// # Panics
    ///
    /// Panics when the user tag space is exhausted.
    fn type_tag() -> TypeTag {
        match TypeRegistry::commands().tag_for::<Self>(Self::NAME, Self::BUILTIN) {
            Ok(tag) => tag,
            Err(e) => panic!("{e}"),
        }
    }
}

/// Derived per-type plumbing of every [`Command`]
pub trait CommandMeta {
    fn tag(&self) -> TypeTag;
    fn type_name(&self) -> &'static str;
    fn wanted_reply(&self) -> TypeTag;
    fn clone_command(&self) -> Box<dyn Command>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: CommandType> CommandMeta for T {
    fn tag(&self) -> TypeTag {
        T::type_tag()
    }

    fn type_name(&self) -> &'static str {
        T::NAME
    }

    fn wanted_reply(&self) -> TypeTag {
        <T::WantedReply as ReplyType>::type_tag()
    }

    fn clone_command(&self) -> Box<dyn Command> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub trait Command: CommandMeta + Send + Sync + fmt::Debug + 'static {
    /// Whether the issuer waits for an answer. Unhandled replies to
    /// commands that expect none are accepted silently.
    fn expects_reply(&self) -> bool {
        true
    }

    fn reply_ok(&self, reply: &dyn Reply) -> bool {
        reply.is_tag(self.wanted_reply()) && reply.ok()
    }

    /// Embedded parent views, nearest first.
    fn ancestors(&self) -> Vec<(TypeTag, &dyn Any)> {
        Vec::new()
    }

    /// Members of a command pack.
    fn members(&self) -> Option<&[Arc<dyn Command>]> {
        None
    }
}

impl dyn Command + '_ {
    pub fn is_tag(&self, tag: TypeTag) -> bool {
        self.tag() == tag || self.ancestors().iter().any(|(t, _)| *t == tag)
    }

    pub fn is<C: CommandType>(&self) -> bool {
        self.is_tag(C::type_tag())
    }

    pub fn downcast_ref<C: CommandType>(&self) -> Option<&C> {
        let wanted = C::type_tag();
        if self.tag() == wanted {
            return self.as_any().downcast_ref::<C>();
        }
        self.ancestors()
            .into_iter()
            .find(|(tag, _)| *tag == wanted)
            .and_then(|(_, view)| view.downcast_ref::<C>())
    }

    pub fn is_pack(&self) -> bool {
        self.members().is_some()
    }
}

impl Clone for Box<dyn Command> {
    fn clone(&self) -> Self {
        self.clone_command()
    }
}

/// Acknowledge, optionally carrying data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandAck {
    pub payload: Payload,
}

impl Command for CommandAck {}

impl CommandType for CommandAck {
    const NAME: &'static str = "CommandAck";
    const BUILTIN: Option<TypeTag> = Some(command_tags::ACKNOWLEDGE);
    type WantedReply = ReplyOk;
}

/// Read request answered with a [`ReplyPayload`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequestPayload {
    /// Optional sub-path of the requested data
    pub path: Option<String>,
}

impl Command for CommandRequestPayload {}

impl CommandType for CommandRequestPayload {
    const NAME: &'static str = "CommandRequestPayload";
    const BUILTIN: Option<TypeTag> = Some(command_tags::REQUEST_PAYLOAD);
    type WantedReply = ReplyPayload;
}

/// Placeholder attached to replies sent without a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandDummy;

impl Command for CommandDummy {
    fn expects_reply(&self) -> bool {
        false
    }
}

impl CommandType for CommandDummy {
    const NAME: &'static str = "CommandDummy";
    const BUILTIN: Option<TypeTag> = Some(command_tags::DUMMY);
    type WantedReply = ReplyOk;
}

/// Fire-and-forget poke; the receiver reacts without replying
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandTrigger;

impl Command for CommandTrigger {
    fn expects_reply(&self) -> bool {
        false
    }
}

impl CommandType for CommandTrigger {
    const NAME: &'static str = "CommandTrigger";
    const BUILTIN: Option<TypeTag> = Some(command_tags::TRIGGER);
    type WantedReply = ReplyOk;
}

/// Ordered sequence of commands executed one after another
#[derive(Debug, Clone, Default)]
pub struct CommandPack {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandPack {
    pub fn new(commands: Vec<Arc<dyn Command>>) -> Result<Self, ProtocolError> {
        let mut pack = Self::default();
        for command in commands {
            pack.push(command)?;
        }
        Ok(pack)
    }

    pub fn push(&mut self, command: Arc<dyn Command>) -> Result<(), ProtocolError> {
        if command.is_pack() {
            return Err(ProtocolError::NestedPack { pack: Self::NAME });
        }
        self.commands.push(command);
        Ok(())
    }

    pub fn commands(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Command for CommandPack {
    /// Also requires one pack entry per command.
    fn reply_ok(&self, reply: &dyn Reply) -> bool {
        let complete = reply
            .downcast_ref::<ReplyPack>()
            .is_some_and(|pack| pack.len() == self.commands.len());
        complete && reply.is_tag(self.wanted_reply()) && reply.ok()
    }

    fn members(&self) -> Option<&[Arc<dyn Command>]> {
        Some(&self.commands)
    }
}

impl CommandType for CommandPack {
    const NAME: &'static str = "CommandPack";
    const BUILTIN: Option<TypeTag> = Some(command_tags::PACK);
    type WantedReply = ReplyPack;
}
