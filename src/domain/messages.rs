use super::{Message, MessageId, UserId};
use std::collections::BTreeSet;
use time::OffsetDateTime;

/// In-memory message list for one conversation plus the viewer's private hide list.
///
/// Rows are never removed: deletes blank content in place, and "delete for me" only adds the
/// id to `hidden`.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    hidden: BTreeSet<MessageId>,
}

impl MessageLog {
    #[cfg(test)]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            hidden: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    /// Swaps in a freshly fetched history. Rows the fetch does not know about (optimistic
    /// sends, pushes that raced the request) stay after it, and the hide list is kept.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        let previous = std::mem::replace(&mut self.messages, history);
        for message in previous {
            if self.get(&message.id).is_none() {
                self.messages.push(message);
            }
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|message| !self.hidden.contains(&message.id))
    }

    pub fn visible_len(&self) -> usize {
        self.visible().count()
    }

    pub fn visible_at(&self, index: usize) -> Option<&Message> {
        self.visible().nth(index)
    }

    pub fn visible_index_of(&self, id: &MessageId) -> Option<usize> {
        self.visible().position(|message| &message.id == id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == id)
    }

    fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| &message.id == id)
    }

    pub fn push_local(
        &mut self,
        sender_id: UserId,
        content: String,
        now: OffsetDateTime,
    ) -> MessageId {
        let id = MessageId::temporary();
        self.messages.push(Message {
            id: id.clone(),
            sender_id,
            content,
            deleted: false,
            edited: false,
            created_at: now,
        });
        id
    }

    /// Swaps a temporary id for the server-assigned one. Returns false when the temp id is
    /// unknown (already reconciled or never sent from here).
    pub fn acknowledge(
        &mut self,
        temp_id: &MessageId,
        server_id: MessageId,
        created_at: Option<OffsetDateTime>,
    ) -> bool {
        if self.get(&server_id).is_some() {
            // The broadcast copy arrived before the ack; keep it and drop the optimistic row.
            if let Some(index) = self.messages.iter().position(|m| &m.id == temp_id) {
                self.messages.remove(index);
                return true;
            }
            return false;
        }

        let Some(message) = self.get_mut(temp_id) else {
            return false;
        };
        message.id = server_id;
        if let Some(created_at) = created_at {
            message.created_at = created_at;
        }
        true
    }

    /// Inserts a message pushed by the server, replacing an existing row with the same id.
    pub fn upsert(&mut self, incoming: Message) {
        match self.get_mut(&incoming.id) {
            Some(existing) => *existing = incoming,
            None => self.messages.push(incoming),
        }
    }

    pub fn apply_edit(&mut self, id: &MessageId, content: &str) -> bool {
        let Some(message) = self.get_mut(id) else {
            return false;
        };
        if message.deleted {
            return false;
        }
        message.content = content.to_string();
        message.edited = true;
        true
    }

    pub fn mark_deleted(&mut self, id: &MessageId) -> bool {
        let Some(message) = self.get_mut(id) else {
            return false;
        };
        message.mark_deleted();
        true
    }

    pub fn hide(&mut self, id: MessageId) {
        self.hidden.insert(id);
    }

    pub fn is_hidden(&self, id: &MessageId) -> bool {
        self.hidden.contains(id)
    }

    #[cfg(test)]
    pub fn hidden(&self) -> &BTreeSet<MessageId> {
        &self.hidden
    }

    /// Ids that may be forwarded: known, server-confirmed and not deleted. Order and
    /// duplicates follow the first occurrence in `ids`.
    pub fn forwardable(&self, ids: &[MessageId]) -> Vec<MessageId> {
        let mut seen = BTreeSet::new();
        ids.iter()
            .filter(|id| !id.is_temporary())
            .filter(|id| self.get(id).is_some_and(|message| !message.deleted))
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, sender: &str, content: &str) -> Message {
        Message {
            id: MessageId::new(id),
            sender_id: UserId::new(sender),
            content: content.to_string(),
            deleted: false,
            edited: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn acknowledge_replaces_temp_id() {
        let mut log = MessageLog::default();
        let temp = log.push_local(UserId::new("a"), "hi".to_string(), OffsetDateTime::UNIX_EPOCH);
        assert!(temp.is_temporary());
        assert!(log.acknowledge(&temp, MessageId::new("42"), None));
        assert!(log.get(&temp).is_none());
        assert_eq!(log.get(&MessageId::new("42")).map(|m| m.content.as_str()), Some("hi"));
        assert!(!log.acknowledge(&temp, MessageId::new("43"), None));
    }

    #[test]
    fn acknowledge_after_broadcast_drops_duplicate_row() {
        let mut log = MessageLog::default();
        let temp = log.push_local(UserId::new("a"), "hi".to_string(), OffsetDateTime::UNIX_EPOCH);
        log.upsert(message("42", "a", "hi"));
        assert!(log.acknowledge(&temp, MessageId::new("42"), None));
        assert_eq!(log.all().len(), 1);
    }

    #[test]
    fn hidden_messages_are_skipped_by_visible() {
        let mut log = MessageLog::new(vec![message("1", "a", "x"), message("2", "b", "y")]);
        log.hide(MessageId::new("1"));
        let visible: Vec<_> = log.visible().map(|m| m.id.as_str().to_string()).collect();
        assert_eq!(visible, vec!["2".to_string()]);
        assert_eq!(log.all().len(), 2);
    }

    #[test]
    fn forwardable_filters_temp_unknown_and_deleted() {
        let mut log = MessageLog::new(vec![
            message("1", "a", "x"),
            message("temp-abc", "a", "y"),
            message("3", "a", "z"),
        ]);
        log.mark_deleted(&MessageId::new("3"));
        let ids = [
            MessageId::new("1"),
            MessageId::new("temp-abc"),
            MessageId::new("3"),
            MessageId::new("missing"),
            MessageId::new("1"),
        ];
        assert_eq!(log.forwardable(&ids), vec![MessageId::new("1")]);
    }

    #[test]
    fn replace_history_keeps_pending_rows_and_hide_list() {
        let mut log = MessageLog::default();
        let temp = log.push_local(
            UserId::new("a"),
            "early".to_string(),
            OffsetDateTime::UNIX_EPOCH,
        );
        log.hide(MessageId::new("1"));

        log.replace_history(vec![message("1", "b", "old"), message("2", "b", "newer")]);

        let ids: Vec<_> = log.all().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids, vec![MessageId::new("1"), MessageId::new("2"), temp.clone()]);
        assert!(log.is_hidden(&MessageId::new("1")));
        assert!(log.acknowledge(&temp, MessageId::new("3"), None));
    }

    #[test]
    fn edits_do_not_resurrect_deleted_messages() {
        let mut log = MessageLog::new(vec![message("1", "a", "x")]);
        log.mark_deleted(&MessageId::new("1"));
        assert!(!log.apply_edit(&MessageId::new("1"), "again"));
        assert_eq!(log.get(&MessageId::new("1")).map(|m| m.content.as_str()), Some(""));
    }
}
