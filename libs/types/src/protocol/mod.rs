//! Open command/reply type protocol

pub mod callback;
pub mod command;
pub mod reply;
pub mod tag;

pub use callback::{AttachedCommand, CallbackFn, CommandCallback};
pub use command::{
    Command, CommandAck, CommandDummy, CommandMeta, CommandPack, CommandRequestPayload,
    CommandTrigger, CommandType,
};
pub use reply::{
    Reply, ReplyFail, ReplyMeta, ReplyOk, ReplyPack, ReplyPayload, ReplyPayloadFail,
    ReplyPayloadOk, ReplyType, ReplyWithPayload, ReplyWithReason,
};
pub use tag::{command_tags, reply_tags, TypeRegistry, TypeTag};

/// `reply_ok` of the command a reply answers.
///
/// Replies to messages without a command fall back to the reply's own flag.
pub fn reply_ok(command: Option<&dyn Command>, reply: &dyn Reply) -> bool {
    match command {
        Some(command) => command.reply_ok(reply),
        None => reply.ok(),
    }
}
