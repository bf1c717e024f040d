use axum::extract::ws::Message as Frame;
use futures_util::{Sink, Stream};
use tokio::sync::mpsc;
use tracing::Instrument;

use super::{
    connection::{Inbound, Outbound},
    hub::HubHandle,
    model::{self, Message, Participant},
    persistence::{self, Persistence},
    table::ParticipantHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Pending deliveries a participant may have before it is dropped as too slow.
    pub outbox_capacity: usize,
    /// Longest accepted message text, in characters.
    pub max_message_len: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            outbox_capacity: 10,
            max_message_len: 4096,
        }
    }
}

/// Bridges one client connection to the hub.
pub struct Session<P> {
    participant: Participant,
    hub: HubHandle,
    persistence: P,
    limits: SessionLimits,
}

impl<P: Persistence> Session<P> {
    pub fn new(participant: Participant, hub: HubHandle, persistence: P, limits: SessionLimits) -> Self {
        Self {
            participant,
            hub,
            persistence,
            limits,
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// Runs until either direction of the connection ends. The participant is
    /// always unregistered on the way out.
    #[tracing::instrument(
        name = "session",
        skip_all,
        fields(
            conversation_id = self.participant.conversation_id,
            participant_id = %self.participant.id,
        )
    )]
    pub async fn run<S, R>(self, sink: S, stream: R)
    where
        S: Sink<Frame, Error = axum::Error> + Unpin + Send + 'static,
        R: Stream<Item = Result<Frame, axum::Error>> + Unpin + Send,
    {
        let Self {
            participant,
            hub,
            persistence,
            limits,
        } = self;

        persistence::report(
            "create_participant",
            persistence.create_participant(&participant).await,
        );

        let (outbox, mut deliveries) = mpsc::channel(limits.outbox_capacity);
        let mut outbound = Outbound::new(sink);

        let handle = ParticipantHandle::new(participant.clone(), outbox);
        let closed = handle.closed.clone();
        if let Err(err) = hub.register(handle).await {
            tracing::warn!(error = %err, "could not join");
            outbound.close().await;
            persistence::report(
                "delete_participant",
                persistence.delete_participant(participant.id).await,
            );
            return;
        }
        tracing::info!(user_id = participant.user_id, "joined");

        let hung_up = closed.clone();
        let mut writer = tokio::spawn(
            async move {
                loop {
                    let message = tokio::select! {
                        _ = hung_up.cancelled() => break,
                        message = deliveries.recv() => match message {
                            Some(message) => message,
                            None => break,
                        },
                    };

                    // a peer that stopped reading must not keep the writer parked here
                    let sent = tokio::select! {
                        _ = hung_up.cancelled() => break,
                        sent = outbound.send(&message) => sent,
                    };
                    if let Err(err) = sent {
                        tracing::warn!(error = %err, "delivery failed");
                        break;
                    }
                }
                outbound.close().await;
            }
            .in_current_span(),
        );

        let mut inbound = Inbound::new(stream);
        let reader = async {
            while let Some(payload) = inbound.next().await {
                let text = match model::parse_payload(&payload, limits.max_message_len) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring inbound payload");
                        continue;
                    }
                };

                if hub.broadcast(Message::new(&participant, text)).await.is_err() {
                    break;
                }
            }
        };

        let writer_done = tokio::select! {
            _ = reader => false,
            _ = &mut writer => true,
            _ = closed.cancelled() => {
                tracing::debug!("dropped by the hub");
                false
            }
        };

        if let Err(err) = hub.unregister(participant.clone()).await {
            tracing::debug!(error = %err, "unregister skipped");
        }
        if !writer_done {
            let _ = writer.await;
        }

        persistence::report(
            "delete_participant",
            persistence.delete_participant(participant.id).await,
        );
        tracing::info!("left");
    }
}
