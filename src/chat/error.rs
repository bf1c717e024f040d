use thiserror::Error;

use super::model::ParticipantId;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    #[error("connection already closed")]
    ConnectionClosed,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("outbound queue of participant {0} is full")]
    QueueFull(ParticipantId),

    #[error("hub is not running")]
    HubStopped,

    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}
