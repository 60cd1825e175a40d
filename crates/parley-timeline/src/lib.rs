/// Parley conversation timeline engine.
///
/// Turns server-delivered message pages into a stable, ordered, grouped
/// message list and keeps it correct while the user scrolls and while
/// real-time mutations arrive:
/// - `store`: flat, deduplicated, chronologically ordered message list
/// - `grouper`: date sections and same-sender clusters
/// - `scroll`: backward pagination with pixel-exact anchor restoration
/// - `receipts`: per-session seen tracking and batched read receipts
/// - `selection`: multi-select state machine and bulk-action rules
/// - `timeline`: the orchestrator owning all of the above

pub mod actions;
pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod grouper;
pub mod http;
pub mod layout;
pub mod overlay;
pub mod receipts;
pub mod render;
pub mod scroll;
pub mod selection;
pub mod store;
pub mod timeline;

pub use actions::{BulkAction, BulkOutcome, BulkPlan, MessageActions};
pub use config::{PlanFeatures, RetryPolicy, TimelineConfig};
pub use content::{ContentTransform, PassThrough, display_body};
pub use error::{ActionError, ConfigError, FetchError, RenderError, TransformError};
pub use fetch::{MemorySource, PageSource, PageTicket, fetch_with_retry};
pub use grouper::{Cluster, DayLabel, GroupContext, Section, SystemRun, group};
pub use http::HttpPageSource;
pub use layout::{Intersection, NodeRect, StackedViewport, Viewport, intersections};
pub use overlay::{IntentField, IntentOverlay};
pub use receipts::{ReceiptSink, SeenTracker};
pub use render::{MessageRenderer, RenderRegistry, Rendered};
pub use scroll::{Anchor, Restore, ScrollAnchorController, ScrollPhase};
pub use selection::{ChannelRole, SelectionController, SelectionMode, ViewerContext};
pub use store::{Direction, MergeReport, PageStore, Upsert};
pub use timeline::{Applied, LoadState, Timeline};
