//! Live conversation hub: who is connected to which conversation, and fan-out
//! of their messages.
//!
//! All membership changes go through one [`Hub`] task. Each connected client
//! runs a [`Session`] with a read side feeding the hub and a write side
//! draining the participant's delivery queue.

mod connection;
mod error;
mod hub;
mod model;
mod persistence;
mod session;
mod table;

pub use connection::{Inbound, Outbound};
pub use error::{ChatError, ChatResult};
pub use hub::{Hub, HubEvent, HubHandle};
pub use model::{parse_payload, validate_text, ConversationId, Message, MessageId, Participant, ParticipantId, UserId};
pub use persistence::Persistence;
pub use session::{Session, SessionLimits};
pub use table::{MembershipTable, ParticipantHandle};
