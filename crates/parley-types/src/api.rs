use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, Message, MessageKind};

// -- Pagination --

/// Optional server-side narrowing of a page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filter", content = "value", rename_all = "snake_case")]
pub enum MessageFilter {
    Pinned,
    Favorites,
    Kind(MessageKind),
}

impl MessageFilter {
    /// Query-string value understood by the message endpoint.
    pub fn as_query(&self) -> String {
        match self {
            Self::Pinned => "pinned".to_string(),
            Self::Favorites => "favorites".to_string(),
            Self::Kind(kind) => match serde_json::to_value(kind) {
                Ok(serde_json::Value::String(s)) => format!("kind:{}", s),
                _ => "kind:unsupported".to_string(),
            },
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Self::Pinned => message.is_pinned,
            Self::Favorites => message.is_favorite,
            Self::Kind(kind) => message.kind == *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub conversation: ConversationId,
    pub limit: u32,
    /// Number of newest messages to skip.
    pub offset: u32,
    #[serde(default)]
    pub filter: Option<MessageFilter>,
}

/// One fetch result. This is the only response shape the engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub messages: Vec<Message>,
    pub next_offset: u32,
    pub has_more: bool,
    pub total_count: u32,
}

impl Page {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            next_offset: 0,
            has_more: false,
            total_count: 0,
        }
    }
}
