use tracing::{debug, trace};

use parley_types::MessageId;

use crate::config::TimelineConfig;
use crate::layout::Viewport;

/// The message used to pin the visual position across a prepend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub message_id: MessageId,
    /// Distance from the container's top edge to the node's top edge.
    pub offset_px: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Idle,
    /// Backward fetch issued; anchor frozen
    AwaitingFetch,
    /// Page merged; waiting for the render commit to restore position
    Restoring,
}

/// Outcome of a restore attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Restore {
    /// The anchor node was found and moved back to its recorded offset.
    Anchored {
        message_id: MessageId,
        shift_px: f64,
    },
    /// The anchor was gone; compensated by the growth in scroll height.
    HeightDelta { delta_px: f64 },
    /// Nothing to restore in the current phase.
    NotRestoring,
}

#[derive(Debug, Clone, Copy)]
struct Frozen {
    anchor: Option<Anchor>,
    scroll_top: f64,
    scroll_height: f64,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    AwaitingFetch(Frozen),
    Restoring(Frozen),
}

/// Drives backward pagination from scroll position and keeps the viewport
/// from jumping when older messages are prepended.
///
/// At most one backward fetch is in flight: every trigger while the
/// controller is not idle is ignored.
#[derive(Debug)]
pub struct ScrollAnchorController {
    state: State,
    near_top_px: f64,
    require_scroll_px: f64,
    /// Post-jump guard: no auto-fetch until the user scrolls past `require_scroll_px`.
    awaiting_user_scroll: bool,
}

impl ScrollAnchorController {
    pub fn new(near_top_px: f64, require_scroll_px: f64) -> Self {
        Self {
            state: State::Idle,
            near_top_px,
            require_scroll_px,
            awaiting_user_scroll: false,
        }
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(config.near_top_threshold_px, config.require_scroll_threshold_px)
    }

    pub fn phase(&self) -> ScrollPhase {
        match self.state {
            State::Idle => ScrollPhase::Idle,
            State::AwaitingFetch(_) => ScrollPhase::AwaitingFetch,
            State::Restoring(_) => ScrollPhase::Restoring,
        }
    }

    /// True while a backward fetch cycle holds the lock.
    pub fn is_locked(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn anchor(&self) -> Option<Anchor> {
        match self.state {
            State::AwaitingFetch(f) | State::Restoring(f) => f.anchor,
            State::Idle => None,
        }
    }

    pub fn awaiting_user_scroll(&self) -> bool {
        self.awaiting_user_scroll
    }

    /// Called on every scroll event. Returns true when a backward fetch
    /// should be issued now; the anchor has then already been frozen.
    pub fn on_scroll<V: Viewport + ?Sized>(&mut self, viewport: &V, has_more: bool) -> bool {
        let scroll_top = viewport.scroll_top();

        if self.awaiting_user_scroll {
            if scroll_top > self.require_scroll_px {
                debug!(scroll_top, "User scrolled past guard, auto-pagination re-enabled");
                self.awaiting_user_scroll = false;
            }
            return false;
        }
        if self.is_locked() {
            trace!(scroll_top, "Backward fetch already in flight");
            return false;
        }
        if !has_more || scroll_top > self.near_top_px {
            return false;
        }
        self.begin(viewport)
    }

    /// Start a backward fetch cycle regardless of scroll position, e.g. from
    /// an explicit "load more". Returns false if a cycle is already running.
    pub fn begin<V: Viewport + ?Sized>(&mut self, viewport: &V) -> bool {
        if self.is_locked() {
            return false;
        }
        let frozen = Frozen {
            anchor: capture_anchor(viewport),
            scroll_top: viewport.scroll_top(),
            scroll_height: viewport.scroll_height(),
        };
        debug!(?frozen.anchor, scroll_top = frozen.scroll_top, "Freezing anchor");
        self.state = State::AwaitingFetch(frozen);
        true
    }

    /// The fetched page has been merged into the store.
    pub fn fetch_merged(&mut self) -> bool {
        match self.state {
            State::AwaitingFetch(frozen) => {
                self.state = State::Restoring(frozen);
                true
            }
            _ => false,
        }
    }

    /// Release the lock without restoring (fetch failed or became stale).
    pub fn abort(&mut self) {
        if self.is_locked() {
            debug!("Backward fetch cycle aborted");
        }
        self.state = State::Idle;
    }

    /// Run after the render that includes the prepended messages has been
    /// committed. Moves the anchor back to its recorded offset, or falls back
    /// to height-delta compensation when the anchor node is gone.
    pub fn restore<V: Viewport + ?Sized>(&mut self, viewport: &mut V) -> Restore {
        let State::Restoring(frozen) = self.state else {
            return Restore::NotRestoring;
        };
        self.state = State::Idle;

        if let Some(anchor) = frozen.anchor {
            if let Some(node) = viewport.node_rect(anchor.message_id) {
                let shift_px = node.top - anchor.offset_px;
                viewport.set_scroll_top(viewport.scroll_top() + shift_px);
                debug!(message_id = %anchor.message_id, shift_px, "Restored scroll anchor");
                return Restore::Anchored {
                    message_id: anchor.message_id,
                    shift_px,
                };
            }
            debug!(message_id = %anchor.message_id, "Anchor node gone, using height delta");
        }

        let delta_px = viewport.scroll_height() - frozen.scroll_height;
        viewport.set_scroll_top(frozen.scroll_top + delta_px);
        Restore::HeightDelta { delta_px }
    }

    /// Disable auto-pagination until the user scrolls down past the guard.
    pub fn require_user_scroll(&mut self) {
        self.awaiting_user_scroll = true;
    }

    /// Bring `id` to the top of the container. Arms the user-scroll guard
    /// and drops any pending restore so the jump is not undone.
    pub fn jump_to_message<V: Viewport + ?Sized>(&mut self, viewport: &mut V, id: MessageId) -> bool {
        let Some(node) = viewport.node_rect(id) else {
            return false;
        };
        self.abort();
        viewport.set_scroll_top(viewport.scroll_top() + node.top);
        self.require_user_scroll();
        true
    }

    pub fn scroll_to_bottom<V: Viewport + ?Sized>(&mut self, viewport: &mut V) {
        self.abort();
        let bottom = (viewport.scroll_height() - viewport.client_height()).max(0.0);
        viewport.set_scroll_top(bottom);
        self.require_user_scroll();
    }

    /// Forget everything; used on conversation switch.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.awaiting_user_scroll = false;
    }
}

/// First node, top-down, whose bottom edge is below the container's top edge.
pub fn capture_anchor<V: Viewport + ?Sized>(viewport: &V) -> Option<Anchor> {
    viewport
        .rendered_nodes()
        .into_iter()
        .find(|node| node.bottom > 0.0)
        .map(|node| Anchor {
            message_id: node.id,
            offset_px: node.top,
        })
}
