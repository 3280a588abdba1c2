//! # Sync Channel
//!
//! Priority-based mutual exclusion for one shared transport, such as a
//! serial bus several adapters poll in turn. Users register with a
//! [`Priority`], ask for a trigger, do their job once triggered and report
//! it done. Only one user is active at a time.
//!
//! [`ChannelState`] holds the scheduling rules; [`Channel`] runs it as a
//! tokio task with an optional minimum gap between consecutive triggers.

pub mod channel;
pub mod error;
pub mod state;

pub use channel::{Channel, ChannelUser, Trigger};
pub use error::ChannelError;
pub use state::{ChannelState, Priority, UserId, UserStatus};
