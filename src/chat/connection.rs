use std::time::Duration;

use axum::{body::Bytes, extract::ws::Message as Frame};
use futures_util::{Sink, SinkExt, Stream, StreamExt};

use super::{
    error::{ChatError, ChatResult},
    model::Message,
};

/// How long a close handshake may take before the connection is abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Write half of a client connection.
pub struct Outbound<S> {
    sink: S,
    closed: bool,
}

impl<S> Outbound<S>
where
    S: Sink<Frame, Error = axum::Error> + Unpin,
{
    pub fn new(sink: S) -> Self {
        Self { sink, closed: false }
    }

    /// Serializes and writes one message. An error means the peer is gone.
    pub async fn send(&mut self, message: &Message) -> ChatResult<()> {
        if self.closed {
            return Err(ChatError::ConnectionClosed);
        }

        let frame = Frame::text(message.to_json()?);
        if let Err(err) = self.sink.send(frame).await {
            self.closed = true;
            return Err(err.into());
        }
        Ok(())
    }

    /// Closes the connection. Calling it again does nothing. A peer that stopped
    /// reading gets [`CLOSE_TIMEOUT`] before the sink is given up on.
    pub async fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }

        let sink = &mut self.sink;
        let handshake = async {
            let _ = sink.send(Frame::Close(None)).await;
            let _ = sink.close().await;
        };
        if tokio::time::timeout(CLOSE_TIMEOUT, handshake).await.is_err() {
            tracing::debug!("close timed out");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Read half of a client connection.
pub struct Inbound<R> {
    stream: R,
    done: bool,
}

impl<R> Inbound<R>
where
    R: Stream<Item = Result<Frame, axum::Error>> + Unpin,
{
    pub fn new(stream: R) -> Self {
        Self { stream, done: false }
    }

    /// Next inbound payload, or `None` once the peer closed or the read failed.
    /// Not restartable: after the first `None` every call returns `None`.
    pub async fn next(&mut self) -> Option<Bytes> {
        while !self.done {
            match self.stream.next().await {
                Some(Ok(frame @ (Frame::Text(_) | Frame::Binary(_)))) => {
                    return Some(frame.into_data());
                }
                Some(Ok(Frame::Ping(_) | Frame::Pong(_))) => continue,
                Some(Ok(Frame::Close(_))) | None => self.done = true,
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "read failed");
                    self.done = true;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{sink, stream};

    use super::*;
    use crate::chat::model::Participant;

    #[tokio::test]
    async fn inbound_skips_control_frames_and_stops_at_close() {
        let frames = vec![
            Ok(Frame::Ping(Bytes::new())),
            Ok(Frame::text("one")),
            Ok(Frame::Binary(Bytes::from_static(b"two"))),
            Ok(Frame::Close(None)),
            Ok(Frame::text("after close")),
        ];
        let mut inbound = Inbound::new(stream::iter(frames));

        assert_eq!(inbound.next().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(inbound.next().await.unwrap(), Bytes::from_static(b"two"));
        assert!(inbound.next().await.is_none());
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn inbound_ends_on_read_error() {
        let frames = vec![
            Err(axum::Error::new(std::io::Error::other("reset"))),
            Ok(Frame::text("never")),
        ];
        let mut inbound = Inbound::new(stream::iter(frames));
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn outbound_reports_failed_send() {
        let broken = sink::unfold((), |(), _: Frame| async {
            Err::<(), _>(axum::Error::new(std::io::Error::other("gone")))
        });
        let mut outbound = Outbound::new(Box::pin(broken));
        let message = Message::new(&Participant::new(7, 1), "hi".to_owned());

        assert!(matches!(outbound.send(&message).await, Err(ChatError::Transport(_))));
        assert!(outbound.is_closed());
        assert!(matches!(outbound.send(&message).await, Err(ChatError::ConnectionClosed)));
    }
}
