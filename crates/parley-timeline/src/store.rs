use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use parley_types::{Message, MessageId};

/// Which end of the list a page extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Backward pagination, prepended above the current list
    Older,
    /// Initial load or refresh, appended below
    Newer,
}

/// Outcome of inserting one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    /// Same id arrived with a newer `updated_at`
    Replaced,
    /// Same id with an equal or older `updated_at`
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub replaced: usize,
    pub ignored: usize,
}

type SortKey = (DateTime<Utc>, MessageId);

/// Flat message list, unique by id and ordered by `created_at` (id breaks ties).
#[derive(Debug, Default)]
pub struct PageStore {
    ordered: BTreeMap<SortKey, Message>,
    index: HashMap<MessageId, DateTime<Utc>>,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fetched page. Ids already present only change when the
    /// incoming copy has a newer `updated_at`.
    pub fn apply_page(&mut self, messages: Vec<Message>, direction: Direction) -> MergeReport {
        let mut report = MergeReport::default();
        for message in messages {
            match self.upsert(message) {
                Upsert::Inserted => report.inserted += 1,
                Upsert::Replaced => report.replaced += 1,
                Upsert::Ignored => report.ignored += 1,
            }
        }
        debug!(
            ?direction,
            inserted = report.inserted,
            replaced = report.replaced,
            ignored = report.ignored,
            total = self.len(),
            "Merged page"
        );
        report
    }

    /// Insert or last-writer-wins replace by `updated_at`.
    pub fn upsert(&mut self, message: Message) -> Upsert {
        let Some(&created_at) = self.index.get(&message.id) else {
            self.insert_new(message);
            return Upsert::Inserted;
        };

        let key = (created_at, message.id);
        let is_newer = self
            .ordered
            .get(&key)
            .is_some_and(|existing| message.updated_at > existing.updated_at);
        if !is_newer {
            trace!(id = %message.id, "Ignoring stale or duplicate copy");
            return Upsert::Ignored;
        }

        self.ordered.remove(&key);
        self.insert_new(message);
        Upsert::Replaced
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let created_at = self.index.remove(&id)?;
        self.ordered.remove(&(created_at, id))
    }

    /// Mutate one message in place. Returns false if the id is unknown.
    pub fn update<F>(&mut self, id: MessageId, f: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(&created_at) = self.index.get(&id) else {
            return false;
        };
        let key = (created_at, id);
        let Some(message) = self.ordered.get_mut(&key) else {
            return false;
        };
        f(message);

        // Keep the sort key honest if the closure moved the message in time
        if message.created_at != created_at || message.id != id {
            if let Some(moved) = self.ordered.remove(&key) {
                self.index.remove(&id);
                self.insert_new(moved);
            }
        }
        true
    }

    /// Mutate every message matching `filter`. Returns how many were touched.
    pub fn update_where<P, F>(&mut self, filter: P, mut f: F) -> usize
    where
        P: Fn(&Message) -> bool,
        F: FnMut(&mut Message),
    {
        let mut touched = 0;
        for message in self.ordered.values_mut().filter(|m| filter(m)) {
            f(message);
            touched += 1;
        }
        touched
    }

    pub fn has_message(&self, id: MessageId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        let created_at = self.index.get(&id)?;
        self.ordered.get(&(*created_at, id))
    }

    /// Messages in ascending `created_at` order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.ordered.values()
    }

    pub fn all_messages(&self) -> Vec<Message> {
        self.ordered.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.ordered.keys().map(|(_, id)| *id).collect()
    }

    /// Messages ordered after `id` that satisfy `filter`. None if `id` is not loaded.
    pub fn count_after<P>(&self, id: MessageId, filter: P) -> Option<usize>
    where
        P: Fn(&Message) -> bool,
    {
        let created_at = *self.index.get(&id)?;
        let count = self
            .ordered
            .range((Bound::Excluded((created_at, id)), Bound::Unbounded))
            .filter(|(_, m)| filter(m))
            .count();
        Some(count)
    }

    pub fn newest(&self) -> Option<&Message> {
        self.ordered.values().next_back()
    }

    pub fn oldest(&self) -> Option<&Message> {
        self.ordered.values().next()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.index.clear();
    }

    fn insert_new(&mut self, message: Message) {
        self.index.insert(message.id, message.created_at);
        self.ordered.insert((message.created_at, message.id), message);
    }
}
