use std::borrow::Cow;
use std::collections::HashMap;

use tracing::debug;

use parley_types::{Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentField {
    Pin,
    Favorite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Intent {
    pinned: Option<bool>,
    favorite: Option<bool>,
}

impl Intent {
    fn slot(&mut self, field: IntentField) -> &mut Option<bool> {
        match field {
            IntentField::Pin => &mut self.pinned,
            IntentField::Favorite => &mut self.favorite,
        }
    }

    fn is_empty(&self) -> bool {
        self.pinned.is_none() && self.favorite.is_none()
    }
}

/// Optimistic pin/favorite flips waiting for server confirmation.
///
/// The canonical message record is never touched by a UI action; views are
/// built by laying pending intents over it. An intent lives until the next
/// authoritative event for that field, or until its request is rejected.
#[derive(Debug, Default)]
pub struct IntentOverlay {
    pending: HashMap<MessageId, Intent>,
}

impl IntentOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, id: MessageId, field: IntentField, value: bool) {
        *self.pending.entry(id).or_default().slot(field) = Some(value);
    }

    pub fn pending(&self, id: MessageId, field: IntentField) -> Option<bool> {
        let intent = self.pending.get(&id)?;
        match field {
            IntentField::Pin => intent.pinned,
            IntentField::Favorite => intent.favorite,
        }
    }

    /// Authoritative state arrived for `field`; the intent is settled.
    pub fn resolve(&mut self, id: MessageId, field: IntentField) {
        self.drop_slot(id, field);
    }

    /// The request failed; fall back to the canonical value.
    pub fn reject(&mut self, id: MessageId, field: IntentField) {
        if self.pending(id, field).is_some() {
            debug!(%id, ?field, "Optimistic change rejected");
        }
        self.drop_slot(id, field);
    }

    pub fn forget(&mut self, id: MessageId) {
        self.pending.remove(&id);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The message as the viewer should see it right now.
    pub fn apply<'a>(&self, message: &'a Message) -> Cow<'a, Message> {
        let Some(intent) = self.pending.get(&message.id) else {
            return Cow::Borrowed(message);
        };
        let mut view = message.clone();
        if let Some(pinned) = intent.pinned {
            view.is_pinned = pinned;
        }
        if let Some(favorite) = intent.favorite {
            view.is_favorite = favorite;
        }
        Cow::Owned(view)
    }

    fn drop_slot(&mut self, id: MessageId, field: IntentField) {
        if let Some(intent) = self.pending.get_mut(&id) {
            *intent.slot(field) = None;
            if intent.is_empty() {
                self.pending.remove(&id);
            }
        }
    }
}
