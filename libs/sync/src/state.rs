//! Scheduling core of a [`Channel`](crate::Channel)
//!
//! Pure bookkeeping with no I/O and no clock: every transition is a method
//! call, and every method that may grant access returns the user to
//! trigger. At most one user holds the busy slot at a time.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Priority {
    Low = 50,
    #[default]
    Normal = 100,
    High = 200,
}

impl TryFrom<u16> for Priority {
    type Error = ChannelError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            50 => Ok(Self::Low),
            100 => Ok(Self::Normal),
            200 => Ok(Self::High),
            other => Err(ChannelError::InvalidPriority(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(u32);

impl UserId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Idle,
    Waiting,
    Active,
}

#[derive(Debug, Clone)]
struct UserState {
    priority: Priority,
    /// Arrival order of the pending ask, `None` when not waiting
    asked: Option<u64>,
    started: bool,
}

#[derive(Debug, Default)]
pub struct ChannelState {
    users: BTreeMap<UserId, UserState>,
    busy: Option<UserId>,
    next_user: u32,
    next_ask: u64,
}

impl ChannelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, priority: Priority) -> UserId {
        let id = UserId(self.next_user);
        self.next_user += 1;
        self.users.insert(id, UserState { priority, asked: None, started: false });
        debug!(user = %id, ?priority, "Channel user registered");
        id
    }

    /// Forget a user. If it held the channel, the slot is released and the
    /// next waiting user, if any, is returned.
    pub fn unregister(&mut self, id: UserId) -> Option<UserId> {
        self.users.remove(&id)?;
        debug!(user = %id, "Channel user unregistered");
        if self.busy == Some(id) {
            self.busy = None;
            return self.check_waiting(None);
        }
        None
    }

    pub fn priority(&self, id: UserId) -> Option<Priority> {
        self.users.get(&id).map(|user| user.priority)
    }

    pub fn status(&self, id: UserId) -> Option<UserStatus> {
        let user = self.users.get(&id)?;
        Some(if self.busy == Some(id) {
            UserStatus::Active
        } else if user.asked.is_some() {
            UserStatus::Waiting
        } else {
            UserStatus::Idle
        })
    }

    pub fn who_is_busy(&self) -> Option<UserId> {
        self.busy
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Record a request for access without granting anything.
    ///
    /// Asking again while already waiting keeps the original place in line.
    pub fn mark_waiting(&mut self, id: UserId) -> Result<(), ChannelError> {
        let user = self.users.get_mut(&id).ok_or(ChannelError::UnknownUser(id))?;
        if user.asked.is_none() {
            user.asked = Some(self.next_ask);
            self.next_ask += 1;
        }
        Ok(())
    }

    /// Ask for access; returns the user to trigger, if the channel was free.
    pub fn ask_trigger(&mut self, id: UserId) -> Result<Option<UserId>, ChannelError> {
        self.mark_waiting(id)?;
        Ok(self.check_waiting(None))
    }

    /// Confirm the triggered user started its job.
    pub fn on_job_start(&mut self, id: UserId) -> Result<(), ChannelError> {
        if self.busy != Some(id) {
            return Err(ChannelError::not_active(id, self.busy));
        }
        if let Some(user) = self.users.get_mut(&id) {
            user.started = true;
        }
        Ok(())
    }

    /// Free the busy slot held by `id` without choosing a successor.
    ///
    /// Returns `false` (after a warning) when `id` was not active.
    pub fn release(&mut self, id: UserId) -> bool {
        if self.busy != Some(id) {
            warn!(user = %id, busy = ?self.busy, "Job done from a user not holding the channel");
            return false;
        }
        self.busy = None;
        if let Some(user) = self.users.get_mut(&id) {
            if !user.started {
                debug!(user = %id, "Job finished without a start notification");
            }
            user.started = false;
        }
        true
    }

    /// Release the channel and trigger the next user, skipping `id` when
    /// someone else is also waiting.
    pub fn on_job_done(&mut self, id: UserId) -> Option<UserId> {
        if !self.release(id) {
            return None;
        }
        self.check_waiting(Some(id))
    }

    /// Grant the channel if it is free.
    ///
    /// Among the waiting users, `ignore` is skipped unless it is the only
    /// one. The highest priority wins; equal priorities go to the earliest
    /// ask.
    pub fn check_waiting(&mut self, ignore: Option<UserId>) -> Option<UserId> {
        if self.busy.is_some() {
            return None;
        }
        let waiting: Vec<(UserId, Priority, u64)> = self
            .users
            .iter()
            .filter_map(|(id, user)| user.asked.map(|seq| (*id, user.priority, seq)))
            .collect();

        let best = if waiting.len() > 1 {
            waiting
                .iter()
                .filter(|(id, _, _)| Some(*id) != ignore)
                .max_by_key(|(_, priority, seq)| (*priority, Reverse(*seq)))
        } else {
            waiting.first()
        };
        let (chosen, _, _) = *best?;

        self.activate(chosen);
        Some(chosen)
    }

    fn activate(&mut self, id: UserId) {
        if let Some(user) = self.users.get_mut(&id) {
            user.asked = None;
            user.started = false;
        }
        self.busy = Some(id);
        debug!(user = %id, "Channel granted");
    }
}
