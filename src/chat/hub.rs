use std::{future::Future, ops::ControlFlow, sync::Arc};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::task::TaskTracker;

use super::{
    error::{ChatError, ChatResult},
    model::{ConversationId, Message, Participant},
    persistence::{self, Persistence},
    table::{MembershipTable, ParticipantHandle},
};

#[derive(Debug)]
pub enum HubEvent {
    Register(ParticipantHandle),
    Unregister(Participant),
    /// A message read from a live connection. Dropped unless its sender is
    /// still a member of the message's conversation.
    Broadcast(Message),
    /// A message whose sender was already checked by the caller.
    Publish(Message),
    Members(ConversationId, oneshot::Sender<Vec<Participant>>),
    Evict(ConversationId),
    Shutdown,
}

/// Cloneable front door to a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
    tasks: TaskTracker,
}

impl HubHandle {
    async fn send(&self, event: HubEvent) -> ChatResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ChatError::HubStopped)
    }

    pub async fn register(&self, handle: ParticipantHandle) -> ChatResult<()> {
        self.send(HubEvent::Register(handle)).await
    }

    pub async fn unregister(&self, participant: Participant) -> ChatResult<()> {
        self.send(HubEvent::Unregister(participant)).await
    }

    pub async fn broadcast(&self, message: Message) -> ChatResult<()> {
        self.send(HubEvent::Broadcast(message)).await
    }

    pub async fn publish(&self, message: Message) -> ChatResult<()> {
        self.send(HubEvent::Publish(message)).await
    }

    /// Live members of a conversation, as of the moment the hub reaches this request.
    pub async fn members(&self, conversation_id: ConversationId) -> ChatResult<Vec<Participant>> {
        let (tx, rx) = oneshot::channel();
        self.send(HubEvent::Members(conversation_id, tx)).await?;
        rx.await.map_err(|_| ChatError::HubStopped)
    }

    pub async fn evict(&self, conversation_id: ConversationId) -> ChatResult<()> {
        self.send(HubEvent::Evict(conversation_id)).await
    }

    pub async fn shutdown(&self) -> ChatResult<()> {
        self.send(HubEvent::Shutdown).await
    }

    /// Counts `future` as outstanding work for [`HubHandle::drain`].
    pub fn track<F: Future>(&self, future: F) -> impl Future<Output = F::Output> + use<F> {
        self.tasks.track_future(future)
    }

    /// Waits for sessions and pending writes to finish. Call after
    /// [`HubHandle::shutdown`] so sessions are told to close.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Single writer of the membership table. Events are handled one at a time in
/// the order they arrive.
pub struct Hub<P> {
    table: MembershipTable,
    persistence: P,
    events: mpsc::Receiver<HubEvent>,
    tasks: TaskTracker,
}

impl<P: Persistence> Hub<P> {
    pub fn new(persistence: P, capacity: usize) -> (Self, HubHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let tasks = TaskTracker::new();
        let hub = Self {
            table: MembershipTable::new(),
            persistence,
            events: rx,
            tasks: tasks.clone(),
        };
        (hub, HubHandle { events: tx, tasks })
    }

    pub fn spawn(persistence: P, capacity: usize) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(persistence, capacity);
        (handle, tokio::spawn(hub.run()))
    }

    pub async fn run(mut self) {
        tracing::info!("hub started");

        while let Some(event) = self.events.recv().await {
            if self.process(event).is_break() {
                break;
            }
        }

        self.close_all();
        tracing::info!("hub stopped");
    }

    pub fn process(&mut self, event: HubEvent) -> ControlFlow<()> {
        match event {
            HubEvent::Register(handle) => self.register(handle),
            HubEvent::Unregister(participant) => self.unregister(&participant),
            HubEvent::Broadcast(message) => self.broadcast(message),
            HubEvent::Publish(message) => self.fan_out(message),
            HubEvent::Members(conversation_id, reply) => {
                let members: Vec<Participant> = self
                    .table
                    .members_of(conversation_id)
                    .iter()
                    .map(|member| member.participant.clone())
                    .collect();
                let _ = reply.send(members);
            }
            HubEvent::Evict(conversation_id) => {
                let evicted = self.table.remove_conversation(conversation_id);
                tracing::info!(conversation_id, evicted = evicted.len(), "conversation evicted");
                evicted.into_iter().for_each(ParticipantHandle::close);
            }
            HubEvent::Shutdown => return ControlFlow::Break(()),
        }

        ControlFlow::Continue(())
    }

    pub fn table(&self) -> &MembershipTable {
        &self.table
    }

    fn register(&mut self, handle: ParticipantHandle) {
        let conversation_id = handle.participant.conversation_id;
        let participant_id = handle.id();

        self.table.add(conversation_id, handle);
        tracing::debug!(
            conversation_id,
            %participant_id,
            members = self.table.members_of(conversation_id).len(),
            "participant registered"
        );
    }

    fn unregister(&mut self, participant: &Participant) {
        if let Some(handle) = self.table.remove(participant.conversation_id, participant.id) {
            handle.close();
            tracing::debug!(
                conversation_id = participant.conversation_id,
                participant_id = %participant.id,
                "participant unregistered"
            );
        }
    }

    fn broadcast(&mut self, message: Message) {
        if self.table.conversation_of(message.participant_id) != Some(message.conversation_id) {
            tracing::debug!(
                conversation_id = message.conversation_id,
                participant_id = %message.participant_id,
                "sender is not a live member, message dropped"
            );
            return;
        }

        self.fan_out(message);
    }

    fn fan_out(&mut self, message: Message) {
        let store = self.persistence.clone();
        let record = message.clone();
        self.tasks.spawn(async move {
            persistence::report("create_message", store.create_message(&record).await);
        });

        let message = Arc::new(message);
        let mut dropped = Vec::new();

        for member in self.table.members_of(message.conversation_id) {
            let Err(err) = member.outbox.try_send(Arc::clone(&message)) else {
                continue;
            };

            let err = match err {
                mpsc::error::TrySendError::Full(_) => ChatError::QueueFull(member.id()),
                mpsc::error::TrySendError::Closed(_) => ChatError::ConnectionClosed,
            };
            tracing::warn!(
                conversation_id = message.conversation_id,
                participant_id = %member.id(),
                error = %err,
                "dropping participant"
            );
            dropped.push(member.participant.clone());
        }

        for participant in dropped {
            self.unregister(&participant);
        }
    }

    fn close_all(&mut self) {
        let remaining: Vec<ParticipantHandle> = self.table.drain().collect();
        if !remaining.is_empty() {
            tracing::info!(closed = remaining.len(), "unregistered remaining participants");
        }
        remaining.into_iter().for_each(ParticipantHandle::close);
    }
}
