mod conversation;
mod new;
mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", post(new::new_conversation))
        .route(
            "/conversations/{id}",
            get(conversation::conversation).delete(conversation::delete_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(conversation::messages).post(conversation::post_message),
        )
        .route("/conversations/{id}/participants", get(conversation::participants))
        .route("/conversations/{id}/online", get(conversation::online))
        .route("/conversations/{id}/ws", get(ws::join))
        .route("/users/{user_id}/conversations", get(conversation::user_conversations))
}

#[derive(Debug, Serialize)]
pub(crate) struct Envelope<T> {
    message: &'static str,
    data: T,
}

impl<T> Envelope<T> {
    pub(crate) fn new(message: &'static str, data: T) -> Self {
        Self { message, data }
    }
}
