use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;

use crate::{
    chat::UserId,
    db::{Conversation, Db},
    AppResult,
};

use super::Envelope;

#[derive(Debug, Deserialize)]
pub(crate) struct NewConversationQuery {
    title: String,
    creator_id: UserId,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_conversation(
    State(db): State<Db>,
    Json(NewConversationQuery { title, creator_id }): Json<NewConversationQuery>,
) -> AppResult<Json<Envelope<Conversation>>> {
    let conversation = db.create_conversation(title.trim(), creator_id).await?;
    tracing::info!(conversation_id = conversation.id, creator_id, "conversation created");

    Ok(Json(Envelope::new("conversation has been created", conversation)))
}
