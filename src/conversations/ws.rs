use axum::{
    debug_handler,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::{
    chat::{ConversationId, HubHandle, Participant, Session, SessionLimits, UserId},
    db::Db,
    AppResult,
};

#[derive(Debug, Deserialize)]
pub(crate) struct JoinQuery {
    user_id: UserId,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn join(
    Path(conversation_id): Path<ConversationId>,
    Query(JoinQuery { user_id }): Query<JoinQuery>,
    State(db): State<Db>,
    State(hub): State<HubHandle>,
    State(limits): State<SessionLimits>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if db.conversation(conversation_id).await?.is_none() {
        return Ok(super::conversation::not_found());
    }

    let tasks = hub.clone();
    let session = Session::new(Participant::new(conversation_id, user_id), hub, db, limits);

    Ok(ws
        .on_failed_upgrade(move |err| {
            tracing::warn!(conversation_id, user_id, error = %err, "websocket upgrade failed");
        })
        .on_upgrade(move |socket| async move {
            let (sender, receiver) = socket.split();
            tasks.track(session.run(sender, receiver)).await;
        })
        .into_response())
}
