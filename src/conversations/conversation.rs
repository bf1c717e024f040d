use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::{
    chat::{self, ConversationId, HubHandle, Message, ParticipantId, SessionLimits, UserId},
    db::Db,
    AppResult,
};

use super::Envelope;

pub(super) fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "conversation not found")
}

fn error(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation(
    State(db): State<Db>,
    Path(id): Path<ConversationId>,
) -> AppResult<Response> {
    let Some(conversation) = db.conversation(id).await? else {
        return Ok(not_found());
    };

    Ok(Json(Envelope::new("conversation has been retrieved", conversation)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_conversation(
    State(db): State<Db>,
    State(hub): State<HubHandle>,
    Path(id): Path<ConversationId>,
) -> AppResult<Response> {
    if !db.delete_conversation(id).await? {
        return Ok(not_found());
    }

    hub.evict(id).await?;
    tracing::info!(conversation_id = id, "conversation deleted");

    Ok(Json(Envelope::new("conversation has been deleted", ())).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn user_conversations(
    State(db): State<Db>,
    Path(user_id): Path<UserId>,
) -> AppResult<Response> {
    let conversations = db.conversations_for_user(user_id).await?;
    Ok(Json(Envelope::new("conversations have been retrieved", conversations)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(
    State(db): State<Db>,
    Path(id): Path<ConversationId>,
) -> AppResult<Response> {
    if db.conversation(id).await?.is_none() {
        return Ok(not_found());
    }

    let messages = db.messages(id).await?;
    Ok(Json(Envelope::new("messages have been retrieved", messages)).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostMessageQuery {
    participant_id: ParticipantId,
    text: String,
}

/// Records a message on behalf of a participant of the conversation and
/// delivers it to whoever is connected.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_message(
    State(db): State<Db>,
    State(hub): State<HubHandle>,
    State(limits): State<SessionLimits>,
    Path(id): Path<ConversationId>,

    Json(PostMessageQuery { participant_id, text }): Json<PostMessageQuery>,
) -> AppResult<Response> {
    if db.conversation(id).await?.is_none() {
        return Ok(not_found());
    }

    let participant = match db.participant(participant_id).await? {
        Some(participant) if participant.conversation_id == id => participant,
        _ => return Ok(error(StatusCode::NOT_FOUND, "participant not found")),
    };

    let text = match chat::validate_text(text, limits.max_message_len) {
        Ok(text) => text,
        Err(err) => return Ok(error(StatusCode::BAD_REQUEST, err)),
    };

    let message = Message::new(&participant, text);
    hub.publish(message.clone()).await?;
    tracing::debug!(conversation_id = id, %participant_id, "message posted");

    Ok(Json(Envelope::new("message has been sent", message)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn participants(
    State(db): State<Db>,
    Path(id): Path<ConversationId>,
) -> AppResult<Response> {
    if db.conversation(id).await?.is_none() {
        return Ok(not_found());
    }

    let participants = db.active_participants(id).await?;
    Ok(Json(Envelope::new("participants have been retrieved", participants)).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn online(
    State(hub): State<HubHandle>,
    Path(id): Path<ConversationId>,
) -> AppResult<Response> {
    let members = hub.members(id).await?;
    Ok(Json(Envelope::new("online participants have been retrieved", members)).into_response())
}
