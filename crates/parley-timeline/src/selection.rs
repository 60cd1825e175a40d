use std::collections::BTreeSet;

use tracing::debug;

use parley_types::{Message, MessageId, UserId};

use crate::config::PlanFeatures;
use crate::store::PageStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelRole {
    #[default]
    Member,
    Admin,
}

/// Who is looking at the timeline, and with what rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: UserId,
    pub role: ChannelRole,
}

impl ViewerContext {
    pub fn member(user_id: UserId) -> Self {
        Self {
            user_id,
            role: ChannelRole::Member,
        }
    }
}

/// Own messages are always deletable; channel admins may delete anyone's
/// channel messages. Direct-message content from the other party never is.
pub fn deletable(message: &Message, viewer: &ViewerContext) -> bool {
    if message.sender_id == viewer.user_id {
        return true;
    }
    message.conversation.is_channel() && viewer.role == ChannelRole::Admin
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Idle,
    Selecting,
}

/// Multi-select state machine.
#[derive(Debug)]
pub struct SelectionController {
    mode: SelectionMode,
    selected: BTreeSet<MessageId>,
    /// Set once something has been selected since entering; an empty
    /// selection after that means the user deselected everything.
    had_selection: bool,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    pub fn new() -> Self {
        Self {
            mode: SelectionMode::Idle,
            selected: BTreeSet::new(),
            had_selection: false,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn is_selecting(&self) -> bool {
        self.mode == SelectionMode::Selecting
    }

    pub fn selected(&self) -> &BTreeSet<MessageId> {
        &self.selected
    }

    pub fn is_selected(&self, id: MessageId) -> bool {
        self.selected.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn enter(&mut self, initial: Option<MessageId>) {
        self.mode = SelectionMode::Selecting;
        self.selected.clear();
        self.had_selection = false;
        if let Some(id) = initial {
            self.selected.insert(id);
            self.had_selection = true;
        }
    }

    /// Flip membership of `id`. Ignored outside selecting mode. Returns
    /// whether `id` is selected afterwards.
    pub fn toggle(&mut self, id: MessageId) -> bool {
        if !self.is_selecting() {
            return false;
        }
        if self.selected.remove(&id) {
            if self.selected.is_empty() && self.had_selection {
                debug!("Last message deselected, leaving selection mode");
                self.exit();
            }
            false
        } else {
            self.selected.insert(id);
            self.had_selection = true;
            true
        }
    }

    /// Empty the selection but stay in selecting mode.
    pub fn clear(&mut self) {
        self.selected.clear();
        self.had_selection = false;
    }

    pub fn exit(&mut self) {
        self.mode = SelectionMode::Idle;
        self.selected.clear();
        self.had_selection = false;
    }

    /// Drop selected ids that no longer exist in `store`. Leaves selecting
    /// mode when pruning emptied the selection or the list itself is empty.
    /// Returns how many ids were dropped.
    pub fn prune(&mut self, store: &PageStore) -> usize {
        let before = self.selected.len();
        self.selected.retain(|id| store.has_message(*id));
        let removed = before - self.selected.len();

        if self.is_selecting() && ((removed > 0 && self.selected.is_empty()) || store.is_empty()) {
            debug!(removed, "Selection emptied by removal, leaving selection mode");
            self.exit();
        }
        removed
    }

    /// Selected messages the viewer may delete, in id order.
    pub fn deletable_ids(&self, store: &PageStore, viewer: &ViewerContext) -> Vec<MessageId> {
        self.selected
            .iter()
            .filter(|id| store.get(**id).is_some_and(|m| deletable(m, viewer)))
            .copied()
            .collect()
    }

    /// One deletable message, or several when the plan allows multi-delete.
    pub fn can_bulk_delete(
        &self,
        store: &PageStore,
        viewer: &ViewerContext,
        features: &PlanFeatures,
    ) -> bool {
        let count = self.selected.len();
        if count == 0 || (count > 1 && !features.multi_delete) {
            return false;
        }
        self.deletable_ids(store, viewer).len() == count
    }
}
