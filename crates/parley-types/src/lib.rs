/// Shared wire and domain types for the Parley chat client.
///
/// Everything that crosses the page-fetch or real-time boundary is defined
/// here so the engine and its collaborators agree on one shape.

pub mod api;
pub mod events;
pub mod models;

pub use api::{MessageFilter, Page, PageRequest};
pub use events::{RealtimeEvent, ReceiptEvent};
pub use models::{
    ConversationId, DeliveryState, Message, MessageId, MessageKind, MessageStatus, Reaction,
    UserId,
};
