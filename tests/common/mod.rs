#![allow(dead_code)]

use std::time::Duration;

use axum::extract::ws::Message as Frame;
use futures_util::{sink, stream, Sink, Stream};
use sqlx::sqlite::SqlitePoolOptions;
use temuka::{
    chat::{ConversationId, HubHandle, Message, ParticipantId},
    db::Db,
};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(2);

pub async fn memory_db() -> Db {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let db = Db::from_pool(pool);
    db.migrate().await.unwrap();
    db
}

/// The far end of a fake WebSocket.
pub struct Client {
    to_server: Option<mpsc::UnboundedSender<Result<Frame, axum::Error>>>,
    from_server: Option<mpsc::Receiver<Frame>>,
}

/// A connection whose write side holds up to `buffer` unread frames before blocking.
pub fn connection(
    buffer: usize,
) -> (
    Client,
    impl Sink<Frame, Error = axum::Error> + Unpin + Send + 'static,
    impl Stream<Item = Result<Frame, axum::Error>> + Unpin + Send + 'static,
) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::channel(buffer);

    let sink = Box::pin(sink::unfold(outbound, |tx: mpsc::Sender<Frame>, frame: Frame| async move {
        tx.send(frame).await.map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(tx)
    }));
    let stream = Box::pin(stream::unfold(inbound, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));

    let client = Client {
        to_server: Some(to_server),
        from_server: Some(from_server),
    };
    (client, sink, stream)
}

impl Client {
    pub fn say(&self, text: &str) {
        self.send_raw(serde_json::json!({ "text": text }).to_string());
    }

    pub fn send_raw(&self, payload: impl Into<String>) {
        let frame = Frame::text(payload.into());
        // the server may already have hung up
        if let Some(tx) = &self.to_server {
            let _ = tx.send(Ok(frame));
        }
    }

    /// Closes the client's side of the connection.
    pub fn hang_up(&mut self) {
        self.to_server.take();
    }

    /// Stops reading, so the server's next write fails.
    pub fn stop_reading(&mut self) {
        self.from_server.take();
    }

    pub async fn next_message(&mut self) -> Message {
        let rx = self.from_server.as_mut().unwrap();
        loop {
            let frame = tokio::time::timeout(WAIT, rx.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("connection closed");
            if let Frame::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Waits until the server closes the connection. Returns false on timeout.
    pub async fn closed(&mut self) -> bool {
        let rx = self.from_server.as_mut().unwrap();
        tokio::time::timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Some(Frame::Close(_)) | None => return,
                    Some(_) => continue,
                }
            }
        })
        .await
        .is_ok()
    }
}

/// Polls the hub until the conversation's live members are exactly `expected`, in order.
pub async fn wait_for_members(hub: &HubHandle, conversation_id: ConversationId, expected: &[ParticipantId]) {
    let result = tokio::time::timeout(WAIT, async {
        loop {
            let members: Vec<_> = hub
                .members(conversation_id)
                .await
                .unwrap()
                .into_iter()
                .map(|p| p.id)
                .collect();
            if members == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(result.is_ok(), "conversation {conversation_id} never reached {expected:?}");
}
