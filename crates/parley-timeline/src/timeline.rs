use std::collections::HashSet;

use tracing::{debug, info, warn};

use parley_types::{
    ConversationId, DeliveryState, Message, MessageFilter, MessageId, Page, PageRequest,
    RealtimeEvent, ReceiptEvent,
};

use crate::actions::{self, BulkAction, BulkOutcome, BulkPlan, MessageActions};
use crate::config::TimelineConfig;
use crate::error::FetchError;
use crate::fetch::{PageSource, PageTicket, fetch_with_retry};
use crate::grouper::{GroupContext, Section, group};
use crate::layout::{Intersection, Viewport};
use crate::overlay::{IntentField, IntentOverlay};
use crate::receipts::{ReceiptSink, SeenTracker};
use crate::scroll::{Restore, ScrollAnchorController, ScrollPhase};
use crate::selection::{ChannelRole, SelectionController, ViewerContext};
use crate::store::{Direction, MergeReport, PageStore, Upsert};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading(Direction),
    /// Retries ran out; shown as a "load more" affordance until retried
    Failed { reason: String },
    /// The start of history is loaded
    Exhausted,
}

/// What happened to a fetch result handed to [`Timeline::apply_page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Merged(MergeReport),
    /// Issued for a conversation session that is no longer open
    Stale,
    Failed,
}

/// One open conversation: the combined state of the page store, grouper,
/// scroll controller, seen tracker and selection, kept consistent across
/// fetches and real-time events.
///
/// Fetching is split around the await point: `open`/`on_scroll` hand out a
/// [`PageTicket`], the caller runs the request, and `apply_page` takes the
/// result back. Real-time events can be applied while a ticket is out.
pub struct Timeline<K> {
    config: TimelineConfig,
    viewer: ViewerContext,
    sink: K,

    conversation: Option<ConversationId>,
    filter: Option<MessageFilter>,
    epoch: u64,

    store: PageStore,
    sections: Vec<Section>,
    group_ctx: GroupContext,
    expanded_runs: HashSet<MessageId>,

    scroll: ScrollAnchorController,
    seen: SeenTracker,
    selection: SelectionController,
    overlay: IntentOverlay,

    next_offset: u32,
    has_more: bool,
    total_count: u32,
    load_state: LoadState,
    unread: u32,
}

impl<K: ReceiptSink> Timeline<K> {
    pub fn new(config: TimelineConfig, viewer: ViewerContext, sink: K, group_ctx: GroupContext) -> Self {
        let scroll = ScrollAnchorController::from_config(&config);
        let seen = SeenTracker::new(viewer.user_id, config.visibility_threshold);
        Self {
            config,
            viewer,
            sink,
            conversation: None,
            filter: None,
            epoch: 0,
            store: PageStore::new(),
            sections: Vec::new(),
            group_ctx,
            expanded_runs: HashSet::new(),
            scroll,
            seen,
            selection: SelectionController::new(),
            overlay: IntentOverlay::new(),
            next_offset: 0,
            has_more: false,
            total_count: 0,
            load_state: LoadState::Idle,
            unread: 0,
        }
    }

    // -- Session --

    /// Switch to `conversation`. Everything tied to the previous session is
    /// dropped and results of its outstanding fetches will be discarded.
    pub fn open(&mut self, conversation: ConversationId, unread: u32) -> PageTicket {
        info!(%conversation, unread, "Opening conversation");
        self.conversation = Some(conversation);
        self.filter = None;
        self.unread = unread;
        self.reset_session();
        self.initial_ticket(conversation)
    }

    /// Reload the open conversation narrowed by `filter`.
    pub fn set_filter(&mut self, filter: Option<MessageFilter>) -> Option<PageTicket> {
        let conversation = self.conversation?;
        debug!(%conversation, ?filter, "Changing filter");
        self.filter = filter;
        self.reset_session();
        Some(self.initial_ticket(conversation))
    }

    fn reset_session(&mut self) {
        self.epoch += 1;
        self.store.clear();
        self.sections.clear();
        self.expanded_runs.clear();
        self.scroll.reset();
        self.seen.reset();
        self.selection.exit();
        self.overlay.clear();
        self.next_offset = 0;
        self.has_more = true;
        self.total_count = 0;
        self.load_state = LoadState::Loading(Direction::Newer);
    }

    fn initial_ticket(&self, conversation: ConversationId) -> PageTicket {
        self.ticket(conversation, Direction::Newer, 0)
    }

    fn ticket(&self, conversation: ConversationId, direction: Direction, offset: u32) -> PageTicket {
        PageTicket {
            conversation,
            epoch: self.epoch,
            direction,
            request: PageRequest {
                conversation,
                limit: self.config.page_size,
                offset,
                filter: self.filter,
            },
        }
    }

    pub fn set_role(&mut self, role: ChannelRole) {
        self.viewer.role = role;
    }

    /// Replace the date context (e.g. the local day rolled over) and regroup.
    pub fn set_group_context(&mut self, ctx: GroupContext) {
        self.group_ctx = ctx;
        self.regroup();
    }

    // -- Pagination --

    /// Run the request behind `ticket` with the configured retry policy.
    pub async fn fetch<S>(&self, source: &S, ticket: &PageTicket) -> Result<Page, FetchError>
    where
        S: PageSource + ?Sized,
    {
        fetch_with_retry(source, &ticket.request, &self.config.retry).await
    }

    /// Take back the result of a ticket's fetch.
    pub fn apply_page(&mut self, ticket: &PageTicket, result: Result<Page, FetchError>) -> Applied {
        if !self.is_current(ticket) {
            warn!(
                conversation = %ticket.conversation,
                epoch = ticket.epoch,
                current_epoch = self.epoch,
                "Discarding result for stale session"
            );
            return Applied::Stale;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(conversation = %ticket.conversation, offset = ticket.request.offset, "Page load failed: {}", e);
                self.load_state = LoadState::Failed {
                    reason: e.to_string(),
                };
                if ticket.direction == Direction::Older {
                    self.scroll.abort();
                }
                return Applied::Failed;
            }
        };

        self.next_offset = page.next_offset;
        self.has_more = page.has_more;
        self.total_count = page.total_count;
        let report = self.store.apply_page(page.messages, ticket.direction);

        if self.has_more {
            self.load_state = LoadState::Idle;
        } else {
            info!(conversation = %ticket.conversation, total = self.total_count, "Reached start of history");
            self.load_state = LoadState::Exhausted;
        }
        if ticket.direction == Direction::Older {
            self.scroll.fetch_merged();
        }

        self.regroup();
        Applied::Merged(report)
    }

    /// Feed a scroll event. Returns the backward-page ticket when a fetch
    /// should start now.
    pub fn on_scroll<V: Viewport + ?Sized>(&mut self, viewport: &V) -> Option<PageTicket> {
        let conversation = self.conversation?;
        if matches!(self.load_state, LoadState::Failed { .. } | LoadState::Loading(_)) {
            return None;
        }
        if !self.scroll.on_scroll(viewport, self.has_more) {
            return None;
        }
        Some(self.older_ticket(conversation))
    }

    /// The "load more" affordance after a failure: reissue the failed load.
    pub fn retry<V: Viewport + ?Sized>(&mut self, viewport: &V) -> Option<PageTicket> {
        let conversation = self.conversation?;
        if !matches!(self.load_state, LoadState::Failed { .. }) {
            return None;
        }
        if self.store.is_empty() {
            debug!(%conversation, "Retrying initial load");
            self.load_state = LoadState::Loading(Direction::Newer);
            return Some(self.initial_ticket(conversation));
        }
        if !self.scroll.begin(viewport) {
            return None;
        }
        debug!(%conversation, offset = self.next_offset, "Retrying older page");
        Some(self.older_ticket(conversation))
    }

    fn older_ticket(&mut self, conversation: ConversationId) -> PageTicket {
        self.load_state = LoadState::Loading(Direction::Older);
        self.ticket(conversation, Direction::Older, self.next_offset)
    }

    fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.epoch == self.epoch && Some(ticket.conversation) == self.conversation
    }

    /// Call once the render that includes the latest merge is committed.
    pub fn render_committed<V: Viewport + ?Sized>(&mut self, viewport: &mut V) -> Restore {
        self.scroll.restore(viewport)
    }

    pub fn jump_to_message<V: Viewport + ?Sized>(&mut self, viewport: &mut V, id: MessageId) -> bool {
        self.scroll.jump_to_message(viewport, id)
    }

    pub fn scroll_to_bottom<V: Viewport + ?Sized>(&mut self, viewport: &mut V) {
        self.scroll.scroll_to_bottom(viewport);
    }

    // -- Receipts --

    /// Feed one intersection batch. Emits the resulting receipts and returns
    /// how many were sent.
    pub fn observe_visibility(&mut self, entries: &[Intersection]) -> usize {
        let Some(conversation) = self.conversation else {
            return 0;
        };
        let events = self.seen.observe(entries, &self.store, conversation, self.unread);
        let count = events.len();
        for event in events {
            if let ReceiptEvent::LastMessageSeen { last_message_id, .. } = event {
                self.settle_unread(last_message_id);
            }
            self.sink.emit(event);
        }
        count
    }

    /// The counter only drops to what is still below the marker; messages
    /// from others that arrived after it stay unread.
    fn settle_unread(&mut self, last_message_id: MessageId) {
        let viewer = self.viewer.user_id;
        let Some(newer) = self
            .store
            .count_after(last_message_id, |m| m.sender_id != viewer)
        else {
            return;
        };
        let remaining = self.unread.min(u32::try_from(newer).unwrap_or(u32::MAX));
        if remaining > 0 {
            debug!(%last_message_id, remaining, "Newer messages still unread");
        }
        self.unread = remaining;
    }

    // -- Real-time events --

    /// Apply one inbound event. Returns true if the timeline changed.
    pub fn apply_event(&mut self, event: RealtimeEvent) -> bool {
        let Some(current) = self.conversation else {
            return false;
        };
        if let Some(scope) = event.conversation() {
            if scope != current {
                debug!(%scope, %current, "Ignoring event for another conversation");
                return false;
            }
        }

        let changed = match event {
            RealtimeEvent::MessageCreated { message } => self.on_created(message),
            RealtimeEvent::MessageUpdated { message } => {
                let id = message.id;
                if !self.store.has_message(id) {
                    false
                } else if self.store.upsert(message) == Upsert::Replaced {
                    self.overlay.resolve(id, IntentField::Pin);
                    self.overlay.resolve(id, IntentField::Favorite);
                    true
                } else {
                    false
                }
            }
            RealtimeEvent::MessageDeleted { id, .. } => self.on_deleted(id),
            RealtimeEvent::MessagePinned { id, .. } => self.set_pinned(id, true),
            RealtimeEvent::MessageUnpinned { id, .. } => self.set_pinned(id, false),
            RealtimeEvent::MessageStatusUpdated { id, reader_id, state } => {
                self.store.update(id, |m| m.set_status(reader_id, state))
            }
            RealtimeEvent::MessagesRead {
                reader_id,
                channel_id,
            } => {
                // Without a channel the marker belongs to the direct thread with the reader
                if channel_id.is_none() && current != ConversationId::Direct(reader_id) {
                    return false;
                }
                let touched = self.store.update_where(
                    |m| m.sender_id != reader_id,
                    |m| m.set_status(reader_id, DeliveryState::Seen),
                );
                debug!(%reader_id, touched, "Marked messages read");
                touched > 0
            }
            RealtimeEvent::ReactionAdd {
                message_id,
                user_id,
                emoji,
            } => {
                let mut changed = false;
                self.store
                    .update(message_id, |m| changed = m.add_reaction(user_id, &emoji));
                changed
            }
            RealtimeEvent::ReactionRemove {
                message_id,
                user_id,
                emoji,
            } => {
                let mut changed = false;
                self.store
                    .update(message_id, |m| changed = m.remove_reaction(user_id, &emoji));
                changed
            }
            RealtimeEvent::FavoriteUpdated { id, is_favorite } => {
                self.overlay.resolve(id, IntentField::Favorite);
                self.store.update(id, |m| m.is_favorite = is_favorite)
            }
        };

        if changed {
            self.regroup();
        }
        changed
    }

    fn on_created(&mut self, message: Message) -> bool {
        if self.filter.is_some_and(|f| !f.matches(&message)) {
            return false;
        }
        let from_other = message.sender_id != self.viewer.user_id;
        match self.store.upsert(message) {
            Upsert::Inserted => {
                if from_other {
                    self.unread += 1;
                }
                // One more message between the newest end and the next older page
                self.next_offset += 1;
                self.total_count += 1;
                true
            }
            Upsert::Replaced => true,
            Upsert::Ignored => false,
        }
    }

    fn on_deleted(&mut self, id: MessageId) -> bool {
        if self.store.remove(id).is_none() {
            return false;
        }
        debug!(%id, "Message deleted");
        self.next_offset = self.next_offset.saturating_sub(1);
        self.total_count = self.total_count.saturating_sub(1);
        self.overlay.forget(id);
        self.expanded_runs.remove(&id);
        self.selection.prune(&self.store);
        true
    }

    fn set_pinned(&mut self, id: MessageId, pinned: bool) -> bool {
        self.overlay.resolve(id, IntentField::Pin);
        self.store.update(id, |m| m.is_pinned = pinned)
    }

    // -- Optimistic intents --

    pub fn request_pin(&mut self, id: MessageId, pinned: bool) -> bool {
        self.request_intent(id, IntentField::Pin, pinned)
    }

    pub fn request_favorite(&mut self, id: MessageId, favorite: bool) -> bool {
        self.request_intent(id, IntentField::Favorite, favorite)
    }

    /// The request behind an intent failed; show the canonical value again.
    pub fn reject_intent(&mut self, id: MessageId, field: IntentField) {
        self.overlay.reject(id, field);
        self.regroup();
    }

    fn request_intent(&mut self, id: MessageId, field: IntentField, value: bool) -> bool {
        if !self.store.has_message(id) {
            return false;
        }
        self.overlay.request(id, field, value);
        self.regroup();
        true
    }

    // -- Selection and bulk actions --

    pub fn selection(&self) -> &SelectionController {
        &self.selection
    }

    /// Enter selecting mode, optionally preselecting a loaded message.
    pub fn enter_selection(&mut self, initial: Option<MessageId>) {
        let initial = initial.filter(|id| self.store.has_message(*id));
        self.selection.enter(initial);
    }

    pub fn toggle_selection(&mut self, id: MessageId) -> bool {
        if !self.store.has_message(id) {
            return false;
        }
        self.selection.toggle(id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn exit_selection(&mut self) {
        self.selection.exit();
    }

    pub fn can_bulk_delete(&self) -> bool {
        self.selection
            .can_bulk_delete(&self.store, &self.viewer, &self.config.features)
    }

    /// Snapshot the selection into a runnable plan. Favorite plans are
    /// applied optimistically right away.
    pub fn plan_bulk(&mut self, action: BulkAction) -> Option<BulkPlan> {
        let conversation = self.conversation?;
        if self.selection.is_empty() {
            return None;
        }
        if action == BulkAction::Delete && !self.can_bulk_delete() {
            debug!(selected = self.selection.len(), "Bulk delete not allowed");
            return None;
        }

        let mut ids = Vec::new();
        let mut skipped = Vec::new();
        for &id in self.selection.selected() {
            let Some(message) = self.store.get(id) else {
                continue;
            };
            let eligible = match action {
                BulkAction::Delete => true,
                BulkAction::Forward(_) => !message.kind.is_special(),
                BulkAction::Favorite(value) => self.overlay.apply(message).is_favorite != value,
            };
            if eligible {
                ids.push(id);
            } else {
                skipped.push(id);
            }
        }

        if let BulkAction::Favorite(value) = action {
            for &id in &ids {
                self.overlay.request(id, IntentField::Favorite, value);
            }
            self.regroup();
        }

        info!(?action, count = ids.len(), skipped = skipped.len(), "Bulk action planned");
        Some(BulkPlan {
            epoch: self.epoch,
            conversation,
            action,
            ids,
            skipped,
        })
    }

    /// Apply a settled bulk action. Selection mode ends whatever the
    /// outcome. Returns the failure notice, if any.
    pub fn finish_bulk(&mut self, outcome: &BulkOutcome) -> Option<String> {
        if outcome.epoch != self.epoch {
            warn!(epoch = outcome.epoch, "Bulk outcome for a closed session");
            return outcome.summary();
        }

        match outcome.action {
            BulkAction::Delete => {
                for &id in &outcome.succeeded {
                    self.on_deleted(id);
                }
            }
            BulkAction::Favorite(value) => {
                for &id in &outcome.succeeded {
                    self.store.update(id, |m| m.is_favorite = value);
                    self.overlay.resolve(id, IntentField::Favorite);
                }
                for (id, _) in &outcome.failed {
                    self.overlay.reject(*id, IntentField::Favorite);
                }
            }
            BulkAction::Forward(_) => {}
        }

        self.selection.exit();
        self.regroup();
        outcome.summary()
    }

    /// Plan, run and finish a bulk action in one go.
    pub async fn run_bulk<A>(&mut self, action: BulkAction, handler: &A) -> Option<BulkOutcome>
    where
        A: MessageActions + ?Sized,
    {
        let plan = self.plan_bulk(action)?;
        let outcome = actions::execute(plan, handler).await;
        self.finish_bulk(&outcome);
        Some(outcome)
    }

    // -- System-message runs --

    /// Flip the expansion of the system run keyed by `key`. Returns the new state.
    pub fn toggle_system_run(&mut self, key: MessageId) -> bool {
        if self.expanded_runs.remove(&key) {
            false
        } else {
            self.expanded_runs.insert(key);
            true
        }
    }

    pub fn is_run_expanded(&self, key: MessageId) -> bool {
        self.expanded_runs.contains(&key)
    }

    // -- Views --

    fn regroup(&mut self) {
        let view: Vec<Message> = self.effective_messages();
        self.sections = group(&view, &self.group_ctx);
    }

    fn effective_messages(&self) -> Vec<Message> {
        self.store
            .iter()
            .map(|m| self.overlay.apply(m).into_owned())
            .collect()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The flat list as the viewer sees it, pending intents included.
    pub fn messages(&self) -> Vec<Message> {
        self.effective_messages()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.store.get(id).map(|m| self.overlay.apply(m).into_owned())
    }

    pub fn message_ids(&self) -> Vec<MessageId> {
        self.store.ids()
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    pub fn filter(&self) -> Option<MessageFilter> {
        self.filter
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn scroll_phase(&self) -> ScrollPhase {
        self.scroll.phase()
    }

    pub fn has_seen(&self, id: MessageId) -> bool {
        self.seen.has_seen(id)
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn viewer(&self) -> &ViewerContext {
        &self.viewer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemorySource;
    use crate::layout::StackedViewport;
    use chrono::{Duration, FixedOffset, TimeZone, Utc};
    use parley_types::MessageKind;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    const ME: Uuid = Uuid::from_u128(1);
    const PEER: Uuid = Uuid::from_u128(2);
    const CHANNEL: ConversationId = ConversationId::Channel(Uuid::from_u128(10));
    const OTHER: ConversationId = ConversationId::Channel(Uuid::from_u128(11));

    fn message(id: i64, sender: Uuid, conversation: ConversationId) -> Message {
        let base = Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap();
        Message {
            id: MessageId(id),
            conversation,
            sender_id: sender,
            kind: MessageKind::Text,
            content: format!("m{}", id),
            created_at: base + Duration::minutes(id),
            updated_at: base,
            parent_id: None,
            reactions: vec![],
            statuses: vec![],
            is_pinned: false,
            is_favorite: false,
        }
    }

    fn timeline() -> (Timeline<mpsc::UnboundedSender<ReceiptEvent>>, mpsc::UnboundedReceiver<ReceiptEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = GroupContext::new(
            FixedOffset::east_opt(0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap().date_naive(),
        );
        let tl = Timeline::new(TimelineConfig::default(), ViewerContext::member(ME), tx, ctx);
        (tl, rx)
    }

    fn page(ids: std::ops::RangeInclusive<i64>, has_more: bool) -> Page {
        let messages: Vec<Message> = ids.map(|i| message(i, PEER, CHANNEL)).collect();
        Page {
            next_offset: messages.len() as u32,
            has_more,
            total_count: 100,
            messages,
        }
    }

    #[test]
    fn open_then_apply_initial_page() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 3);
        assert_eq!(ticket.request.offset, 0);
        assert_eq!(ticket.direction, Direction::Newer);
        assert_eq!(*tl.load_state(), LoadState::Loading(Direction::Newer));

        let applied = tl.apply_page(&ticket, Ok(page(1..=20, true)));
        assert!(matches!(applied, Applied::Merged(r) if r.inserted == 20));
        assert_eq!(tl.message_ids().len(), 20);
        assert_eq!(*tl.load_state(), LoadState::Idle);
        assert_eq!(tl.sections().len(), 1);
    }

    #[test]
    fn results_from_previous_session_are_discarded() {
        let (mut tl, _rx) = timeline();
        let stale = tl.open(CHANNEL, 0);
        let fresh = tl.open(OTHER, 0);

        assert_eq!(tl.apply_page(&stale, Ok(page(1..=5, false))), Applied::Stale);
        assert!(tl.store().is_empty());
        assert!(matches!(tl.apply_page(&fresh, Ok(Page::empty())), Applied::Merged(_)));
        assert_eq!(*tl.load_state(), LoadState::Exhausted);
    }

    #[test]
    fn failed_older_fetch_waits_for_explicit_retry() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(21..=40, true)));

        let mut vp = StackedViewport::new(400.0, 40.0);
        vp.render(tl.message_ids());
        let older = tl.on_scroll(&vp).unwrap();
        assert_eq!(older.request.offset, 20);

        let applied = tl.apply_page(&older, Err(FetchError::Status { status: 503 }));
        assert_eq!(applied, Applied::Failed);
        assert!(matches!(tl.load_state(), LoadState::Failed { .. }));
        assert!(tl.has_more());
        assert_eq!(tl.scroll_phase(), ScrollPhase::Idle);

        // Still at the top, but no automatic refetch
        assert!(tl.on_scroll(&vp).is_none());
        let retried = tl.retry(&vp).unwrap();
        assert_eq!(retried.request.offset, 20);
        assert_eq!(tl.scroll_phase(), ScrollPhase::AwaitingFetch);
    }

    #[tokio::test]
    async fn fetch_uses_ticket_request() {
        let (mut tl, _rx) = timeline();
        let source = MemorySource::new((1..=30).map(|i| message(i, PEER, CHANNEL)).collect());
        let ticket = tl.open(CHANNEL, 0);
        let result = tl.fetch(&source, &ticket).await;
        tl.apply_page(&ticket, result);
        assert_eq!(tl.message_ids().first(), Some(&MessageId(11)));
        assert_eq!(tl.next_offset(), 20);
    }

    #[test]
    fn events_for_other_conversations_are_ignored() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));

        assert!(!tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(50, PEER, OTHER),
        }));
        assert!(!tl.apply_event(RealtimeEvent::MessageDeleted {
            id: MessageId(2),
            conversation: OTHER,
        }));
        assert_eq!(tl.message_ids().len(), 3);
    }

    #[test]
    fn created_messages_bump_unread_and_receipts_zero_it() {
        let (mut tl, mut rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));

        assert!(tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(4, PEER, CHANNEL),
        }));
        assert!(tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(5, ME, CHANNEL),
        }));
        assert_eq!(tl.unread(), 1);

        let emitted = tl.observe_visibility(&[Intersection {
            id: MessageId(4),
            ratio: 1.0,
        }]);
        assert_eq!(emitted, 2);
        assert_eq!(tl.unread(), 0);
        assert!(matches!(rx.try_recv(), Ok(ReceiptEvent::MessageSeen { .. })));
        assert!(matches!(rx.try_recv(), Ok(ReceiptEvent::LastMessageSeen { .. })));
    }

    #[test]
    fn messages_read_in_direct_thread_marks_seen() {
        let (mut tl, _rx) = timeline();
        let dm = ConversationId::Direct(PEER);
        let ticket = tl.open(dm, 0);
        tl.apply_page(
            &ticket,
            Ok(Page {
                messages: vec![message(1, ME, dm), message(2, PEER, dm)],
                next_offset: 2,
                has_more: false,
                total_count: 2,
            }),
        );

        // Read marker for some other direct thread
        assert!(!tl.apply_event(RealtimeEvent::MessagesRead {
            reader_id: Uuid::from_u128(77),
            channel_id: None,
        }));
        assert!(tl.apply_event(RealtimeEvent::MessagesRead {
            reader_id: PEER,
            channel_id: None,
        }));
        let mine = tl.message(MessageId(1)).unwrap();
        assert_eq!(mine.status_for(PEER), Some(DeliveryState::Seen));
        assert_eq!(tl.message(MessageId(2)).unwrap().status_for(PEER), None);
    }

    #[test]
    fn pin_intent_shows_until_authoritative_event() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));

        assert!(tl.request_pin(MessageId(2), true));
        assert!(tl.message(MessageId(2)).unwrap().is_pinned);
        assert!(!tl.store().get(MessageId(2)).unwrap().is_pinned);

        // Server says otherwise
        tl.apply_event(RealtimeEvent::MessageUnpinned {
            id: MessageId(2),
            conversation: CHANNEL,
        });
        assert!(!tl.message(MessageId(2)).unwrap().is_pinned);

        assert!(tl.request_favorite(MessageId(3), true));
        tl.reject_intent(MessageId(3), IntentField::Favorite);
        assert!(!tl.message(MessageId(3)).unwrap().is_favorite);
    }

    #[test]
    fn reactions_apply_in_place() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=1, false)));

        let add = RealtimeEvent::ReactionAdd {
            message_id: MessageId(1),
            user_id: ME,
            emoji: "👍".into(),
        };
        assert!(tl.apply_event(add.clone()));
        assert!(!tl.apply_event(add));
        assert_eq!(tl.message(MessageId(1)).unwrap().reactions[0].count, 1);

        assert!(tl.apply_event(RealtimeEvent::ReactionRemove {
            message_id: MessageId(1),
            user_id: ME,
            emoji: "👍".into(),
        }));
        assert!(tl.message(MessageId(1)).unwrap().reactions.is_empty());
    }

    #[test]
    fn deletion_prunes_selection() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=8, false)));
        tl.enter_selection(Some(MessageId(5)));
        tl.toggle_selection(MessageId(7));

        tl.apply_event(RealtimeEvent::MessageDeleted {
            id: MessageId(5),
            conversation: CHANNEL,
        });
        assert!(tl.selection().is_selecting());
        assert!(tl.selection().is_selected(MessageId(7)));

        tl.apply_event(RealtimeEvent::MessageDeleted {
            id: MessageId(7),
            conversation: CHANNEL,
        });
        assert!(!tl.selection().is_selecting());
    }

    #[test]
    fn conversation_switch_forces_idle_selection() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));
        tl.enter_selection(Some(MessageId(1)));
        tl.open(OTHER, 0);
        assert!(!tl.selection().is_selecting());
        assert!(tl.selection().is_empty());
    }

    #[test]
    fn toggling_unknown_ids_is_refused() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));
        tl.enter_selection(Some(MessageId(99)));
        assert!(tl.selection().is_selecting());
        assert!(tl.selection().is_empty());
        assert!(!tl.toggle_selection(MessageId(99)));
    }

    #[test]
    fn bulk_favorite_is_optimistic_and_rolls_back_failures() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));
        tl.enter_selection(Some(MessageId(1)));
        tl.toggle_selection(MessageId(2));

        let plan = tl.plan_bulk(BulkAction::Favorite(true)).unwrap();
        assert_eq!(plan.ids, vec![MessageId(1), MessageId(2)]);
        assert!(tl.message(MessageId(1)).unwrap().is_favorite);

        let outcome = BulkOutcome {
            epoch: plan.epoch,
            action: plan.action,
            succeeded: vec![MessageId(1)],
            failed: vec![(MessageId(2), crate::error::ActionError::Request("nope".into()))],
            skipped: vec![],
        };
        let notice = tl.finish_bulk(&outcome);
        assert_eq!(notice.as_deref(), Some("1 message(s) could not be added to favorites"));
        assert!(tl.store().get(MessageId(1)).unwrap().is_favorite);
        assert!(!tl.message(MessageId(2)).unwrap().is_favorite);
        assert!(!tl.selection().is_selecting());
    }

    #[test]
    fn forward_skips_system_messages() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        let mut system = message(2, PEER, CHANNEL);
        system.kind = MessageKind::System;
        tl.apply_page(
            &ticket,
            Ok(Page {
                messages: vec![message(1, PEER, CHANNEL), system],
                next_offset: 2,
                has_more: false,
                total_count: 2,
            }),
        );
        tl.enter_selection(Some(MessageId(1)));
        tl.toggle_selection(MessageId(2));

        let plan = tl.plan_bulk(BulkAction::Forward(OTHER)).unwrap();
        assert_eq!(plan.ids, vec![MessageId(1)]);
        assert_eq!(plan.skipped, vec![MessageId(2)]);
    }

    #[test]
    fn system_run_expansion_is_per_key() {
        let (mut tl, _rx) = timeline();
        assert!(tl.toggle_system_run(MessageId(4)));
        assert!(tl.is_run_expanded(MessageId(4)));
        assert!(!tl.is_run_expanded(MessageId(5)));
        assert!(!tl.toggle_system_run(MessageId(4)));
        assert!(!tl.is_run_expanded(MessageId(4)));
    }

    #[test]
    fn filter_reload_narrows_requests_and_live_events() {
        let (mut tl, _rx) = timeline();
        tl.open(CHANNEL, 0);
        let ticket = tl.set_filter(Some(MessageFilter::Pinned)).unwrap();
        assert_eq!(ticket.request.filter, Some(MessageFilter::Pinned));
        tl.apply_page(&ticket, Ok(Page::empty()));

        assert!(!tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(9, PEER, CHANNEL),
        }));
    }

    #[test]
    fn message_updated_is_last_writer_wins() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=3, false)));
        tl.request_pin(MessageId(2), true);

        let mut edited = message(2, PEER, CHANNEL);
        edited.content = "edited".into();
        edited.updated_at = edited.updated_at + Duration::minutes(10);
        assert!(tl.apply_event(RealtimeEvent::MessageUpdated { message: edited }));
        let shown = tl.message(MessageId(2)).unwrap();
        assert_eq!(shown.content, "edited");
        // The authoritative copy replaced the pending pin
        assert!(!shown.is_pinned);

        // An older copy delivered late changes nothing
        let mut stale = message(2, PEER, CHANNEL);
        stale.content = "stale".into();
        stale.updated_at = stale.updated_at + Duration::minutes(5);
        assert!(!tl.apply_event(RealtimeEvent::MessageUpdated { message: stale }));
        assert_eq!(tl.message(MessageId(2)).unwrap().content, "edited");

        // Updates for messages that were never loaded are not inserted
        assert!(!tl.apply_event(RealtimeEvent::MessageUpdated {
            message: message(99, PEER, CHANNEL),
        }));
        assert!(!tl.store().has_message(MessageId(99)));
    }

    #[test]
    fn status_updates_upsert_one_reader() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=1, false)));
        let other = Uuid::from_u128(3);

        assert!(tl.apply_event(RealtimeEvent::MessageStatusUpdated {
            id: MessageId(1),
            reader_id: ME,
            state: DeliveryState::Delivered,
        }));
        assert!(tl.apply_event(RealtimeEvent::MessageStatusUpdated {
            id: MessageId(1),
            reader_id: ME,
            state: DeliveryState::Seen,
        }));
        assert!(tl.apply_event(RealtimeEvent::MessageStatusUpdated {
            id: MessageId(1),
            reader_id: other,
            state: DeliveryState::Delivered,
        }));
        assert!(!tl.apply_event(RealtimeEvent::MessageStatusUpdated {
            id: MessageId(42),
            reader_id: ME,
            state: DeliveryState::Seen,
        }));

        let m = tl.message(MessageId(1)).unwrap();
        assert_eq!(m.statuses.len(), 2);
        assert_eq!(m.status_for(ME), Some(DeliveryState::Seen));
        assert_eq!(m.status_for(other), Some(DeliveryState::Delivered));
    }

    #[test]
    fn pin_and_favorite_events_resolve_intents() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=2, false)));

        tl.request_favorite(MessageId(1), true);
        assert!(tl.apply_event(RealtimeEvent::FavoriteUpdated {
            id: MessageId(1),
            is_favorite: true,
        }));
        assert!(tl.store().get(MessageId(1)).unwrap().is_favorite);
        // With the intent gone the canonical value shows through
        tl.apply_event(RealtimeEvent::FavoriteUpdated {
            id: MessageId(1),
            is_favorite: false,
        });
        assert!(!tl.message(MessageId(1)).unwrap().is_favorite);

        tl.request_pin(MessageId(2), false);
        assert!(tl.apply_event(RealtimeEvent::MessagePinned {
            id: MessageId(2),
            conversation: CHANNEL,
        }));
        assert!(tl.message(MessageId(2)).unwrap().is_pinned);
    }

    #[test]
    fn live_inserts_and_deletes_shift_next_offset() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(21..=40, true)));
        assert_eq!(tl.next_offset(), 20);

        tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(41, PEER, CHANNEL),
        });
        assert_eq!(tl.next_offset(), 21);
        assert_eq!(tl.total_count(), 101);

        // Redelivery of a known message is not a new one
        tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(41, PEER, CHANNEL),
        });
        assert_eq!(tl.next_offset(), 21);

        tl.apply_event(RealtimeEvent::MessageDeleted {
            id: MessageId(30),
            conversation: CHANNEL,
        });
        tl.apply_event(RealtimeEvent::MessageDeleted {
            id: MessageId(30),
            conversation: CHANNEL,
        });
        assert_eq!(tl.next_offset(), 20);
        assert_eq!(tl.total_count(), 100);

        let mut vp = StackedViewport::new(400.0, 40.0);
        vp.render(tl.message_ids());
        assert_eq!(tl.on_scroll(&vp).unwrap().request.offset, 20);
    }

    #[test]
    fn bulk_delete_cleans_up_like_live_delete() {
        let (mut tl, _rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=6, true)));
        tl.toggle_system_run(MessageId(2));
        tl.request_favorite(MessageId(3), true);
        tl.enter_selection(Some(MessageId(2)));
        tl.toggle_selection(MessageId(3));

        let outcome = BulkOutcome {
            epoch: tl.epoch(),
            action: BulkAction::Delete,
            succeeded: vec![MessageId(2), MessageId(3)],
            failed: vec![],
            skipped: vec![],
        };
        assert_eq!(tl.finish_bulk(&outcome), None);

        assert!(!tl.is_run_expanded(MessageId(2)));
        assert!(!tl.store().has_message(MessageId(3)));
        assert_eq!(tl.next_offset(), 4);
        assert!(!tl.selection().is_selecting());
        assert_eq!(tl.message_ids().len(), 4);
    }

    #[test]
    fn receipt_for_older_rows_keeps_newer_unread() {
        let (mut tl, mut rx) = timeline();
        let ticket = tl.open(CHANNEL, 0);
        tl.apply_page(&ticket, Ok(page(1..=20, false)));

        tl.apply_event(RealtimeEvent::MessageCreated {
            message: message(21, PEER, CHANNEL),
        });
        assert_eq!(tl.unread(), 1);

        tl.observe_visibility(&[Intersection {
            id: MessageId(11),
            ratio: 1.0,
        }]);
        let _ = rx.try_recv();
        assert!(matches!(
            rx.try_recv(),
            Ok(ReceiptEvent::LastMessageSeen { last_message_id: MessageId(11), .. })
        ));
        assert_eq!(tl.unread(), 1);

        tl.observe_visibility(&[Intersection {
            id: MessageId(21),
            ratio: 1.0,
        }]);
        let _ = rx.try_recv();
        assert!(matches!(
            rx.try_recv(),
            Ok(ReceiptEvent::LastMessageSeen { last_message_id: MessageId(21), .. })
        ));
        assert_eq!(tl.unread(), 0);
    }
}
