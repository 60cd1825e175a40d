mod script;
mod view;

use std::path::Path;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use parley_crypto::{ChannelCipher, ChannelKey};
use parley_timeline::{
    Applied, ContentTransform, HttpPageSource, LoadState, MemorySource, PageSource, PageTicket,
    PassThrough, StackedViewport, Timeline, TimelineConfig, Viewport, intersections,
};
use parley_types::ReceiptEvent;

use crate::script::Script;

type Sink = mpsc::UnboundedSender<ReceiptEvent>;

const CLIENT_HEIGHT: f64 = 600.0;
const ROW_HEIGHT: f64 = 48.0;
const MAX_SCROLL_STEPS: usize = 10_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_timeline=debug".into()),
        )
        .init();

    // Config
    let config = TimelineConfig::from_env()?;
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PARLEY_SCRIPT").ok())
        .context("usage: parley-replay <script.json>")?;
    let script = Script::load(Path::new(&path))?;

    let transform: Box<dyn ContentTransform> = match std::env::var("PARLEY_CHANNEL_KEY") {
        Ok(key) => Box::new(ChannelCipher::new(&ChannelKey::from_base64(&key)?)),
        Err(_) => Box::new(PassThrough),
    };

    match std::env::var("PARLEY_SERVER_URL") {
        Ok(url) => {
            info!("Replaying against live server at {}", url);
            let source = HttpPageSource::new(url, std::env::var("PARLEY_TOKEN").ok());
            replay(config, &script, &source, transform.as_ref()).await
        }
        Err(_) => {
            info!(path = %path, messages = script.messages.len(), "Replaying script");
            let source = MemorySource::new(script.messages.clone());
            replay(config, &script, &source, transform.as_ref()).await
        }
    }
}

/// Load the newest page, scroll all the way up through history, apply the
/// scripted events, then print the result.
async fn replay<S: PageSource>(
    config: TimelineConfig,
    script: &Script,
    source: &S,
    transform: &dyn ContentTransform,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut timeline = Timeline::new(config, script.viewer(), tx, script.group_context()?);
    let mut viewport = StackedViewport::new(CLIENT_HEIGHT, ROW_HEIGHT);

    let ticket = timeline.open(script.conversation, script.unread);
    load(&mut timeline, source, &mut viewport, &ticket).await;
    viewport.scroll_to_end();
    observe(&mut timeline, &viewport, &mut rx)?;

    let mut retries_left = 1;
    for _ in 0..MAX_SCROLL_STEPS {
        if let Some(ticket) = timeline.on_scroll(&viewport) {
            load(&mut timeline, source, &mut viewport, &ticket).await;
        }

        if matches!(timeline.load_state(), LoadState::Failed { .. }) {
            if retries_left == 0 {
                warn!("Giving up on older history");
                break;
            }
            retries_left -= 1;
            if let Some(ticket) = timeline.retry(&viewport) {
                load(&mut timeline, source, &mut viewport, &ticket).await;
            }
            continue;
        }

        observe(&mut timeline, &viewport, &mut rx)?;
        if viewport.scroll_top() <= 0.0 && !timeline.has_more() {
            break;
        }
        viewport.scroll_by(-CLIENT_HEIGHT / 2.0);
    }

    for event in script.events.iter().cloned() {
        if timeline.apply_event(event) {
            viewport.render(timeline.message_ids());
        }
    }
    observe(&mut timeline, &viewport, &mut rx)?;

    for key in &script.expand_runs {
        timeline.toggle_system_run(*key);
    }
    view::print_timeline(&timeline, &view::registry(), transform, script.offset()?);

    info!(
        messages = timeline.message_ids().len(),
        unread = timeline.unread(),
        "Replay finished"
    );
    Ok(())
}

async fn load<S: PageSource>(
    timeline: &mut Timeline<Sink>,
    source: &S,
    viewport: &mut StackedViewport,
    ticket: &PageTicket,
) {
    let result = timeline.fetch(source, ticket).await;
    match timeline.apply_page(ticket, result) {
        Applied::Merged(report) => {
            viewport.render(timeline.message_ids());
            let restore = timeline.render_committed(viewport);
            debug!(inserted = report.inserted, ?restore, "Page rendered");
        }
        Applied::Stale => debug!("Dropped stale page"),
        Applied::Failed => warn!(offset = ticket.request.offset, "Page load failed"),
    }
}

fn observe(
    timeline: &mut Timeline<Sink>,
    viewport: &StackedViewport,
    rx: &mut mpsc::UnboundedReceiver<ReceiptEvent>,
) -> anyhow::Result<()> {
    timeline.observe_visibility(&intersections(viewport));
    while let Ok(event) = rx.try_recv() {
        info!(receipt = %serde_json::to_string(&event)?, "Emitting receipt");
    }
    Ok(())
}
