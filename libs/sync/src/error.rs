use crate::state::UserId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel priority {0}, expected 50, 100 or 200")]
    InvalidPriority(u16),

    #[error("user {0} is not registered on this channel")]
    UnknownUser(UserId),

    #[error("user {user} is not active on the channel (busy: {busy})")]
    NotActive { user: UserId, busy: String },

    #[error("channel {0} is closed")]
    Closed(String),
}

impl ChannelError {
    pub fn not_active(user: UserId, busy: Option<UserId>) -> Self {
        Self::NotActive {
            user,
            busy: busy.map_or_else(|| "nobody".to_string(), |id| id.to_string()),
        }
    }

    pub fn closed(channel: &str) -> Self {
        Self::Closed(channel.to_string())
    }
}
