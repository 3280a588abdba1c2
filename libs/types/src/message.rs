//! Message envelope
//!
//! A message is addressed by worker identity, carries routing flags and a
//! payload, and may hold one command and one reply in its service data.
//! Messages compare equal by id only.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::ProtocolError;
use crate::ids::{MessageId, NameResolver, WorkerId};
use crate::payload::Payload;
use crate::protocol::callback::AttachedCommand;
use crate::protocol::command::{Command, CommandDummy};
use crate::protocol::reply::Reply;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MessageFlags: u8 {
        const VALID = 1 << 0;
        const BROADCAST = 1 << 1;
        const DIRECT = 1 << 2;
        const COMMAND = 1 << 3;
        const REPLY = 1 << 4;
    }
}

#[derive(Debug, Clone, Default)]
struct ServiceData {
    command: Option<Arc<AttachedCommand>>,
    reply: Option<Arc<dyn Reply>>,
    private: Payload,
    user_data: Option<(serde_json::Value, String)>,
    bad_reason: Option<String>,
    request_id: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct Message {
    id: MessageId,
    sender: Option<WorkerId>,
    receivers: BTreeSet<WorkerId>,
    flags: MessageFlags,
    payload: Payload,
    service: ServiceData,
}

impl Message {
    /// Fresh valid message without receivers.
    pub fn new(sender: Option<WorkerId>) -> Self {
        Self {
            id: MessageId::next(),
            sender,
            receivers: BTreeSet::new(),
            flags: MessageFlags::VALID,
            payload: Payload::new(),
            service: ServiceData::default(),
        }
    }

    /// Fresh message addressed to explicit workers.
    pub fn addressed(sender: Option<WorkerId>, receivers: impl IntoIterator<Item = WorkerId>) -> Self {
        let mut msg = Self::new(sender);
        msg.receivers.extend(receivers);
        msg
    }

    /// Fresh message addressed by worker name; every name must resolve.
    pub fn to_names<S: AsRef<str>>(
        sender: Option<WorkerId>,
        resolver: &dyn NameResolver,
        names: &[S],
    ) -> Result<Self, ProtocolError> {
        let receivers = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                resolver
                    .resolve(name)
                    .ok_or_else(|| ProtocolError::UnknownReceiver(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::addressed(sender, receivers))
    }

    /// Reply addressed back to the sender of `self`.
    ///
    /// The reply keeps the payload and the attached command of the request
    /// (so callbacks travel back), gets a fresh id and records the request
    /// id for correlation.
    pub fn reply_to(&self, from: WorkerId, reply: Arc<dyn Reply>) -> Message {
        let mut out = self.clone();
        out.id = MessageId::next();
        out.sender = Some(from);
        out.receivers = self.sender.into_iter().collect();
        out.flags.remove(MessageFlags::BROADCAST | MessageFlags::DIRECT);
        out.service.request_id = Some(self.id);
        out.set_reply(reply);
        out
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Give a copy its own identity.
    pub fn renew_id(&mut self) {
        self.id = MessageId::next();
    }

    pub fn request_id(&self) -> Option<MessageId> {
        self.service.request_id
    }

    pub fn sender(&self) -> Option<WorkerId> {
        self.sender
    }

    pub fn set_sender(&mut self, sender: Option<WorkerId>) {
        self.sender = sender;
    }

    pub fn receivers(&self) -> &BTreeSet<WorkerId> {
        &self.receivers
    }

    pub fn set_receivers(&mut self, receivers: impl IntoIterator<Item = WorkerId>) {
        self.receivers = receivers.into_iter().collect();
    }

    pub fn add_receiver(&mut self, receiver: WorkerId) {
        self.receivers.insert(receiver);
    }

    pub fn is_addressed_to(&self, worker: WorkerId) -> bool {
        self.receivers.contains(&worker)
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    pub fn is_valid(&self) -> bool {
        self.flags.contains(MessageFlags::VALID)
    }

    /// Mark invalid; an empty reason becomes "Not given".
    pub fn invalidate(&mut self, reason: &str) {
        let reason = if reason.is_empty() { "Not given" } else { reason };
        self.flags.remove(MessageFlags::VALID);
        self.service.bad_reason = Some(reason.to_string());
    }

    pub fn bad_reason(&self) -> Option<&str> {
        self.service.bad_reason.as_deref()
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags.contains(MessageFlags::BROADCAST)
    }

    pub fn set_broadcast(&mut self, on: bool) {
        self.flags.set(MessageFlags::BROADCAST, on);
    }

    pub fn is_direct(&self) -> bool {
        self.flags.contains(MessageFlags::DIRECT)
    }

    pub fn set_direct(&mut self, on: bool) {
        self.flags.set(MessageFlags::DIRECT, on);
    }

    pub fn is_command(&self) -> bool {
        self.flags.contains(MessageFlags::COMMAND)
    }

    pub fn is_reply(&self) -> bool {
        self.flags.contains(MessageFlags::REPLY)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }

    /// Side-channel fields that never leave the process.
    pub fn private(&self) -> &Payload {
        &self.service.private
    }

    pub fn private_mut(&mut self) -> &mut Payload {
        &mut self.service.private
    }

    /// Opaque value attached by the sending worker, with a free-form
    /// description of what it holds.
    pub fn user_data(&self) -> Option<(&serde_json::Value, &str)> {
        self.service.user_data.as_ref().map(|(value, description)| (value, description.as_str()))
    }

    pub fn set_user_data(&mut self, value: impl Into<serde_json::Value>, description: impl Into<String>) {
        self.service.user_data = Some((value.into(), description.into()));
    }

    pub fn clear_user_data(&mut self) {
        self.service.user_data = None;
    }

    pub fn set_command(&mut self, command: Arc<dyn Command>) {
        self.attach_command(AttachedCommand::new(command));
    }

    pub fn attach_command(&mut self, attached: AttachedCommand) {
        self.service.command = Some(Arc::new(attached));
        self.flags.insert(MessageFlags::COMMAND);
    }

    pub fn command(&self) -> Option<&dyn Command> {
        self.service.command.as_ref().map(|attached| attached.command().as_ref())
    }

    pub fn attached(&self) -> Option<&Arc<AttachedCommand>> {
        self.service.command.as_ref()
    }

    /// Attach a reply; a message without a command gets a placeholder one.
    pub fn set_reply(&mut self, reply: Arc<dyn Reply>) {
        if self.service.command.is_none() {
            self.set_command(Arc::new(CommandDummy));
        }
        self.service.reply = Some(reply);
        self.flags.insert(MessageFlags::REPLY);
    }

    pub fn reply(&self) -> Option<&dyn Reply> {
        self.service.reply.as_deref()
    }

    pub fn reply_arc(&self) -> Option<&Arc<dyn Reply>> {
        self.service.reply.as_ref()
    }

    /// Detach the reply, turning a reply back into a request copy.
    pub fn clear_reply(&mut self) {
        self.service.reply = None;
        self.flags.remove(MessageFlags::REPLY);
    }

    /// Check the flag/object invariant of the service data.
    pub fn check_service_data(&self) -> Result<(), ProtocolError> {
        if self.is_command() && self.service.command.is_none() {
            return Err(ProtocolError::missing_command(self.id.get()));
        }
        if self.is_reply() && self.service.reply.is_none() {
            return Err(ProtocolError::missing_reply(self.id.get()));
        }
        Ok(())
    }

    /// Compact flag summary such as `VBD-R` (valid, broadcast, direct,
    /// command, reply; `-` when unset).
    pub fn flags_string(&self) -> String {
        [
            (MessageFlags::VALID, 'V'),
            (MessageFlags::BROADCAST, 'B'),
            (MessageFlags::DIRECT, 'D'),
            (MessageFlags::COMMAND, 'C'),
            (MessageFlags::REPLY, 'R'),
        ]
        .iter()
        .map(|(flag, c)| if self.flags.contains(*flag) { *c } else { '-' })
        .collect()
    }

    /// Multi-line dump used by `print_msgs` and journals.
    pub fn debug_dump(&self, resolver: Option<&dyn NameResolver>) -> String {
        let name = |id: WorkerId| {
            resolver
                .and_then(|r| r.name_of(id))
                .unwrap_or_else(|| id.to_string())
        };

        let mut out = String::new();
        let _ = writeln!(out, "message {} [{}]", self.id, self.flags_string());
        let sender = self.sender.map(name).unwrap_or_else(|| "<none>".to_string());
        let _ = writeln!(out, "  sender: {sender}");
        let receivers: Vec<String> = self.receivers.iter().map(|id| name(*id)).collect();
        let _ = writeln!(out, "  receivers: [{}]", receivers.join(", "));
        if let Some(request) = self.service.request_id {
            let _ = writeln!(out, "  in reply to: {request}");
        }
        if let Some(command) = self.command() {
            let _ = writeln!(out, "  command: {} {}", command.type_name(), command.tag());
        }
        if let Some(reply) = self.reply() {
            let _ = writeln!(
                out,
                "  reply: {} ok={} reason={:?}",
                reply.type_name(),
                reply.ok(),
                reply.reason()
            );
        }
        if let Some(reason) = self.bad_reason() {
            let _ = writeln!(out, "  bad: {reason}");
        }
        if let Some((value, description)) = self.user_data() {
            let _ = writeln!(out, "  user data ({description}): {value}");
        }
        for (path, value) in self.payload.flatten(":") {
            let _ = writeln!(out, "  {path} = {value}");
        }
        out
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{} [{}]", self.id, self.flags_string())
    }
}
