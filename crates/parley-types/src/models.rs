use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// Server-assigned message sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The thread a message list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversationId {
    Channel(Uuid),
    /// Direct thread, keyed by the other participant.
    Direct(UserId),
}

impl ConversationId {
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Path segment pair used by the HTTP page source.
    pub fn path(&self) -> (&'static str, Uuid) {
        match self {
            Self::Channel(id) => ("channels", *id),
            Self::Direct(id) => ("direct", *id),
        }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(id) => write!(f, "channel:{}", id),
            Self::Direct(id) => write!(f, "direct:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Audio,
    Link,
    Location,
    Call,
    Reminder,
    System,
    /// Anything this client does not know how to render.
    #[serde(other)]
    Unsupported,
}

impl MessageKind {
    /// Kinds that never share a cluster with their neighbours.
    pub fn is_special(self) -> bool {
        matches!(self, Self::System | Self::Call | Self::Reminder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Seen,
}

/// Per-reader delivery state of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStatus {
    pub reader_id: UserId,
    pub state: DeliveryState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation: ConversationId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    /// Opaque body; may be ciphertext.
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub statuses: Vec<MessageStatus>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Message {
    /// Add `user_id`'s reaction. Returns false if it was already present.
    pub fn add_reaction(&mut self, user_id: UserId, emoji: &str) -> bool {
        match self.reactions.iter_mut().find(|r| r.emoji == emoji) {
            Some(group) if group.user_ids.contains(&user_id) => false,
            Some(group) => {
                group.user_ids.push(user_id);
                group.count = group.user_ids.len();
                true
            }
            None => {
                self.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    count: 1,
                    user_ids: vec![user_id],
                });
                true
            }
        }
    }

    /// Remove `user_id`'s reaction, dropping the group once it is empty.
    pub fn remove_reaction(&mut self, user_id: UserId, emoji: &str) -> bool {
        let Some(pos) = self.reactions.iter().position(|r| r.emoji == emoji) else {
            return false;
        };
        let group = &mut self.reactions[pos];
        let before = group.user_ids.len();
        group.user_ids.retain(|u| *u != user_id);
        group.count = group.user_ids.len();
        let removed = group.count != before;
        if group.user_ids.is_empty() {
            self.reactions.remove(pos);
        }
        removed
    }

    /// Insert or replace the status for one reader.
    pub fn set_status(&mut self, reader_id: UserId, state: DeliveryState) {
        match self.statuses.iter_mut().find(|s| s.reader_id == reader_id) {
            Some(status) => status.state = state,
            None => self.statuses.push(MessageStatus { reader_id, state }),
        }
    }

    pub fn status_for(&self, reader_id: UserId) -> Option<DeliveryState> {
        self.statuses
            .iter()
            .find(|s| s.reader_id == reader_id)
            .map(|s| s.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        let now = Utc::now();
        Message {
            id: MessageId(1),
            conversation: ConversationId::Channel(Uuid::nil()),
            sender_id: Uuid::new_v4(),
            kind: MessageKind::Text,
            content: "hi".into(),
            created_at: now,
            updated_at: now,
            parent_id: None,
            reactions: vec![],
            statuses: vec![],
            is_pinned: false,
            is_favorite: false,
        }
    }

    #[test]
    fn reactions_group_by_emoji() {
        let mut m = message();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(m.add_reaction(a, "👍"));
        assert!(!m.add_reaction(a, "👍"));
        assert!(m.add_reaction(b, "👍"));
        assert_eq!(m.reactions.len(), 1);
        assert_eq!(m.reactions[0].count, 2);

        assert!(m.remove_reaction(a, "👍"));
        assert_eq!(m.reactions[0].count, 1);
        assert!(m.remove_reaction(b, "👍"));
        assert!(m.reactions.is_empty());
        assert!(!m.remove_reaction(b, "👍"));
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let kind: MessageKind = serde_json::from_str("\"sticker\"").unwrap();
        assert_eq!(kind, MessageKind::Unsupported);
        assert!(MessageKind::Reminder.is_special());
        assert!(!MessageKind::Image.is_special());
    }

    #[test]
    fn status_upsert_replaces_existing_reader() {
        let mut m = message();
        let reader = Uuid::new_v4();
        m.set_status(reader, DeliveryState::Delivered);
        m.set_status(reader, DeliveryState::Seen);
        assert_eq!(m.statuses.len(), 1);
        assert_eq!(m.status_for(reader), Some(DeliveryState::Seen));
    }
}
