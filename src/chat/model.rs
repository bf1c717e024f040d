use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::{ChatError, ChatResult};

pub type ConversationId = i64;
pub type UserId = i64;
pub type ParticipantId = Uuid;
pub type MessageId = Uuid;

/// One user's membership in one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub conversation_id: ConversationId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Participant {
    pub fn new(conversation_id: ConversationId, user_id: UserId) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            user_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A chat message as broadcast to live members and recorded by persistence.
/// Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub participant_id: ParticipantId,
    pub sender_id: UserId,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn new(sender: &Participant, text: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id: sender.conversation_id,
            participant_id: sender.id,
            sender_id: sender.user_id,
            text,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn to_json(&self) -> ChatResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageQuery {
    text: String,
}

/// Parses one inbound frame into message text.
pub fn parse_payload(payload: &[u8], max_len: usize) -> ChatResult<String> {
    let SendMessageQuery { text } = serde_json::from_slice(payload)?;
    validate_text(text, max_len)
}

/// Rejects blank text and text longer than `max_len` characters.
pub fn validate_text(text: String, max_len: usize) -> ChatResult<String> {
    if text.trim().is_empty() {
        return Err(ChatError::MalformedPayload("empty text".to_owned()));
    }

    let len = text.chars().count();
    if len > max_len {
        return Err(ChatError::MalformedPayload(format!(
            "text is {len} characters, limit is {max_len}"
        )));
    }

    Ok(text)
}
