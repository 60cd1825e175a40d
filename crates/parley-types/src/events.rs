use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationId, DeliveryState, Message, MessageId, UserId};

/// Events pushed to the client by the real-time channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// A new message was posted
    #[serde(rename = "message:created")]
    MessageCreated { message: Message },

    /// A message was edited or otherwise rewritten by the server
    #[serde(rename = "message:updated")]
    MessageUpdated { message: Message },

    #[serde(rename = "message:deleted")]
    MessageDeleted {
        id: MessageId,
        conversation: ConversationId,
    },

    #[serde(rename = "message:pinned")]
    MessagePinned {
        id: MessageId,
        conversation: ConversationId,
    },

    #[serde(rename = "message:unpinned")]
    MessageUnpinned {
        id: MessageId,
        conversation: ConversationId,
    },

    /// One reader's delivery state changed
    #[serde(rename = "message:status-updated")]
    MessageStatusUpdated {
        id: MessageId,
        reader_id: UserId,
        state: DeliveryState,
    },

    /// A reader caught up on a conversation. Without a channel id this
    /// refers to the direct thread with the reader.
    #[serde(rename = "messages:read")]
    MessagesRead {
        reader_id: UserId,
        channel_id: Option<Uuid>,
    },

    #[serde(rename = "reaction:add")]
    ReactionAdd {
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
    },

    #[serde(rename = "reaction:remove")]
    ReactionRemove {
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
    },

    /// Authoritative favorite state for the current viewer
    #[serde(rename = "message:favorite-updated")]
    FavoriteUpdated { id: MessageId, is_favorite: bool },
}

impl RealtimeEvent {
    /// Returns the conversation this event is scoped to, if it carries one.
    /// Events that return `None` are matched by message id instead.
    pub fn conversation(&self) -> Option<ConversationId> {
        match self {
            Self::MessageCreated { message } | Self::MessageUpdated { message } => {
                Some(message.conversation)
            }
            Self::MessageDeleted { conversation, .. }
            | Self::MessagePinned { conversation, .. }
            | Self::MessageUnpinned { conversation, .. } => Some(*conversation),
            Self::MessagesRead {
                channel_id: Some(channel_id),
                ..
            } => Some(ConversationId::Channel(*channel_id)),
            // Status, reactions, favorites and DM read markers are keyed by id/reader
            _ => None,
        }
    }
}

/// Read-receipt signals emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReceiptEvent {
    /// Newly seen messages from one author
    #[serde(rename = "message:seen")]
    MessageSeen {
        message_ids: Vec<MessageId>,
        author_id: UserId,
    },

    /// Latest visible message; lets the server reset the unread counter
    #[serde(rename = "last-message-seen")]
    LastMessageSeen {
        last_message_id: MessageId,
        conversation: ConversationId,
    },
}
