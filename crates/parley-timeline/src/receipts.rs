use std::collections::{BTreeMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use parley_types::{ConversationId, MessageId, ReceiptEvent, UserId};

use crate::layout::Intersection;
use crate::store::PageStore;

/// Outbound read-receipt channel. Fire-and-forget.
pub trait ReceiptSink {
    fn emit(&self, event: ReceiptEvent);
}

impl ReceiptSink for mpsc::UnboundedSender<ReceiptEvent> {
    fn emit(&self, event: ReceiptEvent) {
        // Receiver gone means the client is shutting down
        let _ = self.send(event);
    }
}

/// Per-session "seen" bookkeeping for one viewer.
#[derive(Debug)]
pub struct SeenTracker {
    viewer: UserId,
    threshold: f64,
    seen: HashSet<MessageId>,
}

impl SeenTracker {
    pub fn new(viewer: UserId, threshold: f64) -> Self {
        Self {
            viewer,
            threshold,
            seen: HashSet::new(),
        }
    }

    pub fn has_seen(&self, id: MessageId) -> bool {
        self.seen.contains(&id)
    }

    /// Forget the session; used on conversation switch.
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// Process one observation batch.
    ///
    /// Messages at or above the visibility threshold that the viewer did not
    /// author and has not seen this session are marked seen and reported in
    /// one `MessageSeen` per author. A `LastMessageSeen` for the newest
    /// visible message follows, unless `unread_count` is already zero.
    pub fn observe(
        &mut self,
        entries: &[Intersection],
        store: &PageStore,
        conversation: ConversationId,
        unread_count: u32,
    ) -> Vec<ReceiptEvent> {
        let mut by_author: BTreeMap<UserId, Vec<MessageId>> = BTreeMap::new();
        let mut newest_visible = None;

        for entry in entries.iter().filter(|e| e.ratio >= self.threshold) {
            let Some(message) = store.get(entry.id) else {
                continue;
            };
            if newest_visible.is_none_or(|(at, id)| (message.created_at, message.id) > (at, id)) {
                newest_visible = Some((message.created_at, message.id));
            }
            if message.sender_id == self.viewer || !self.seen.insert(message.id) {
                continue;
            }
            by_author.entry(message.sender_id).or_default().push(message.id);
        }

        let mut events: Vec<ReceiptEvent> = by_author
            .into_iter()
            .map(|(author_id, mut message_ids)| {
                message_ids.sort();
                debug!(%author_id, count = message_ids.len(), "Messages seen");
                ReceiptEvent::MessageSeen {
                    message_ids,
                    author_id,
                }
            })
            .collect();

        match newest_visible {
            Some((_, last_message_id)) if unread_count > 0 => {
                events.push(ReceiptEvent::LastMessageSeen {
                    last_message_id,
                    conversation,
                });
            }
            Some(_) => trace!("Unread counter already zero, skipping mark-read"),
            None => {}
        }
        events
    }
}
