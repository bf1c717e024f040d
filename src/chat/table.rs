use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::model::{ConversationId, Message, Participant, ParticipantId};

/// A live participant: its record, the sending side of its delivery queue, and
/// the signal that tells its session to hang up.
#[derive(Debug)]
pub struct ParticipantHandle {
    pub participant: Participant,
    pub outbox: mpsc::Sender<Arc<Message>>,
    pub closed: CancellationToken,
}

impl ParticipantHandle {
    pub fn new(participant: Participant, outbox: mpsc::Sender<Arc<Message>>) -> Self {
        Self {
            participant,
            outbox,
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.participant.id
    }

    /// Tells the session to close its connection, even if its writer is stuck
    /// mid-send, and drops the delivery queue.
    pub fn close(self) {
        self.closed.cancel();
    }
}

/// Conversation id -> live participants, in registration order.
///
/// A participant is listed under at most one conversation, and conversations
/// with no members are dropped.
#[derive(Debug, Default)]
pub struct MembershipTable {
    conversations: HashMap<ConversationId, Vec<ParticipantHandle>>,
    locations: HashMap<ParticipantId, ConversationId>,
}

impl MembershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conversation_id: ConversationId, handle: ParticipantHandle) {
        let id = handle.id();

        if let Some(previous) = self.locations.get(&id).copied() {
            if previous != conversation_id {
                self.remove(previous, id);
            }
        }

        let members = self.conversations.entry(conversation_id).or_default();
        match members.iter_mut().find(|member| member.id() == id) {
            Some(existing) => *existing = handle,
            None => members.push(handle),
        }
        self.locations.insert(id, conversation_id);
    }

    /// Removes a participant by identity. Returns the handle if it was present.
    pub fn remove(
        &mut self,
        conversation_id: ConversationId,
        participant_id: ParticipantId,
    ) -> Option<ParticipantHandle> {
        let members = self.conversations.get_mut(&conversation_id)?;
        let index = members.iter().position(|member| member.id() == participant_id)?;
        let handle = members.remove(index);

        if members.is_empty() {
            self.conversations.remove(&conversation_id);
        }
        self.locations.remove(&participant_id);

        Some(handle)
    }

    /// Removes a whole conversation, returning its members.
    pub fn remove_conversation(&mut self, conversation_id: ConversationId) -> Vec<ParticipantHandle> {
        let members = self.conversations.remove(&conversation_id).unwrap_or_default();
        for member in &members {
            self.locations.remove(&member.id());
        }
        members
    }

    pub fn members_of(&self, conversation_id: ConversationId) -> &[ParticipantHandle] {
        self.conversations
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn conversation_of(&self, participant_id: ParticipantId) -> Option<ConversationId> {
        self.locations.get(&participant_id).copied()
    }

    pub fn contains_conversation(&self, conversation_id: ConversationId) -> bool {
        self.conversations.contains_key(&conversation_id)
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Number of live participants across all conversations.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ParticipantHandle> + '_ {
        self.locations.clear();
        self.conversations.drain().flat_map(|(_, members)| members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(conversation_id: ConversationId, user_id: i64) -> (ParticipantHandle, mpsc::Receiver<Arc<Message>>) {
        let (outbox, rx) = mpsc::channel(4);
        let participant = Participant::new(conversation_id, user_id);
        (ParticipantHandle::new(participant, outbox), rx)
    }

    #[test]
    fn add_and_remove_members() {
        let mut table = MembershipTable::new();
        let (x, _rx_x) = handle(7, 1);
        let (y, _rx_y) = handle(7, 2);
        let (x_id, y_id) = (x.id(), y.id());

        table.add(7, x);
        table.add(7, y);
        let members: Vec<_> = table.members_of(7).iter().map(ParticipantHandle::id).collect();
        assert_eq!(members, vec![x_id, y_id]);

        assert!(table.remove(7, y_id).is_some());
        assert_eq!(table.members_of(7).len(), 1);

        assert!(table.remove(7, x_id).is_some());
        assert!(!table.contains_conversation(7));
        assert!(table.is_empty());
    }

    #[test]
    fn remove_twice_is_a_noop() {
        let mut table = MembershipTable::new();
        let (x, _rx_x) = handle(7, 1);
        let (y, _rx_y) = handle(7, 2);
        let x_id = x.id();
        table.add(7, x);
        table.add(7, y);

        assert!(table.remove(7, x_id).is_some());
        assert!(table.remove(7, x_id).is_none());
        assert_eq!(table.members_of(7).len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remove_under_wrong_conversation_is_a_noop() {
        let mut table = MembershipTable::new();
        let (x, _rx) = handle(7, 1);
        let x_id = x.id();
        table.add(7, x);

        assert!(table.remove(8, x_id).is_none());
        assert_eq!(table.conversation_of(x_id), Some(7));
    }

    #[test]
    fn participant_lives_in_one_conversation() {
        let mut table = MembershipTable::new();
        let (x, _rx) = handle(7, 1);
        let x_id = x.id();
        let moved = ParticipantHandle::new(x.participant.clone(), x.outbox.clone());

        table.add(7, x);
        table.add(9, moved);

        assert_eq!(table.conversation_of(x_id), Some(9));
        assert!(!table.contains_conversation(7));
        assert_eq!(table.members_of(9).len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn re_adding_replaces_instead_of_duplicating() {
        let mut table = MembershipTable::new();
        let (x, _rx) = handle(7, 1);
        let again = ParticipantHandle::new(x.participant.clone(), x.outbox.clone());

        table.add(7, x);
        table.add(7, again);
        assert_eq!(table.members_of(7).len(), 1);
    }

    #[test]
    fn remove_conversation_clears_locations() {
        let mut table = MembershipTable::new();
        let (x, _rx_x) = handle(7, 1);
        let (y, _rx_y) = handle(7, 2);
        let (z, _rx_z) = handle(8, 3);
        table.add(7, x);
        table.add(7, y);
        table.add(8, z);

        assert_eq!(table.remove_conversation(7).len(), 2);
        assert_eq!(table.len(), 1);
        assert_eq!(table.conversation_count(), 1);
        assert!(table.members_of(7).is_empty());
    }
}
