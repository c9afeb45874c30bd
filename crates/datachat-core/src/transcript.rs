//! Append-only message log for a single conversation.

use chrono::Utc;

use crate::{
    domain::{Message, MessageId, NewMessage},
    errors::Error,
    Result,
};

#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    last_id: u64,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end of the transcript.
    ///
    /// The store assigns the id (strictly increasing) and the capture timestamp.
    /// Blank content is rejected; nothing is stored in that case.
    pub fn append(&mut self, msg: NewMessage) -> Result<Message> {
        if msg.content.trim().is_empty() {
            return Err(Error::InvalidMessage(format!(
                "{} message content must not be blank",
                msg.sender.as_str()
            )));
        }

        self.last_id += 1;
        let stored = Message {
            id: MessageId(self.last_id),
            content: msg.content,
            sender: msg.sender,
            timestamp: Utc::now(),
        };
        self.messages.push(stored.clone());
        Ok(stored)
    }

    /// Point-in-time copy of the full transcript in insertion order.
    pub fn all(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sender;

    #[test]
    fn append_assigns_increasing_ids_in_order() {
        let mut store = TranscriptStore::new();
        let a = store.append(NewMessage::user("first")).unwrap();
        let b = store.append(NewMessage::bot("second")).unwrap();
        let c = store.append(NewMessage::user("third")).unwrap();

        assert!(a.id < b.id && b.id < c.id);

        let all = store.all();
        let contents: Vec<_> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
        assert_eq!(all[1].sender, Sender::Bot);
    }

    #[test]
    fn blank_content_is_rejected_without_appending() {
        let mut store = TranscriptStore::new();
        store.append(NewMessage::user("hi")).unwrap();

        for blank in ["", "   ", "\n\t"] {
            let err = store.append(NewMessage::bot(blank)).unwrap_err();
            assert!(matches!(err, Error::InvalidMessage(_)));
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn user_content_is_stored_verbatim() {
        let mut store = TranscriptStore::new();
        let msg = store.append(NewMessage::user("  padded aqi?  ")).unwrap();
        assert_eq!(msg.content, "  padded aqi?  ");
        assert_eq!(store.last().map(|m| m.id), Some(msg.id));
    }

    #[test]
    fn snapshots_are_not_affected_by_later_appends() {
        let mut store = TranscriptStore::new();
        store.append(NewMessage::user("one")).unwrap();
        let snapshot = store.all();

        store.append(NewMessage::bot("two")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.all().len(), 2);
        assert!(!store.is_empty());
    }
}
