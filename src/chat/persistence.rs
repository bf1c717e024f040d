use std::future::Future;

use super::{
    error::ChatError,
    model::{Message, Participant, ParticipantId},
};

/// Durable record of conversation membership and message history.
///
/// The hub never waits on these for its in-memory bookkeeping: a failure is
/// reported and the live path carries on.
pub trait Persistence: Clone + Send + Sync + 'static {
    fn create_participant(
        &self,
        participant: &Participant,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn create_message(&self, message: &Message) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn delete_participant(
        &self,
        participant_id: ParticipantId,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub(crate) fn report(operation: &'static str, result: anyhow::Result<()>) {
    if let Err(err) = result {
        let err = ChatError::from(err);
        tracing::error!(operation, error = %err, "persistence failed");
    }
}
