use chrono::FixedOffset;

use parley_timeline::{
    Cluster, ContentTransform, ReceiptSink, RenderError, RenderRegistry, Rendered, Timeline,
    display_body,
};
use parley_types::{DeliveryState, Message, MessageKind};

/// Plain-text renderers for every message kind the terminal can show.
pub fn registry() -> RenderRegistry<String> {
    let mut registry = RenderRegistry::new();
    registry.register(MessageKind::Text, text);
    registry.register(MessageKind::Link, text);
    registry.register(MessageKind::Image, attachment);
    registry.register(MessageKind::Video, attachment);
    registry.register(MessageKind::File, attachment);
    registry.register(MessageKind::Audio, attachment);
    registry.register(MessageKind::Location, location);
    registry.register(MessageKind::Call, notice);
    registry.register(MessageKind::Reminder, notice);
    registry.register(MessageKind::System, notice);
    registry
}

fn text(_: &Message, body: &str) -> Result<String, RenderError> {
    Ok(body.to_string())
}

fn attachment(message: &Message, body: &str) -> Result<String, RenderError> {
    Ok(format!("[{:?}] {}", message.kind, body))
}

fn notice(_: &Message, body: &str) -> Result<String, RenderError> {
    Ok(format!("* {}", body))
}

fn location(_: &Message, body: &str) -> Result<String, RenderError> {
    let bad = || RenderError(format!("bad coordinates {:?}", body));
    let (lat, lng) = body.split_once(',').ok_or_else(bad)?;
    let lat: f64 = lat.trim().parse().map_err(|_| bad())?;
    let lng: f64 = lng.trim().parse().map_err(|_| bad())?;
    Ok(format!("[Location] {:.4}, {:.4}", lat, lng))
}

/// Print the grouped timeline the way a chat view would lay it out.
pub fn print_timeline<K: ReceiptSink>(
    timeline: &Timeline<K>,
    registry: &RenderRegistry<String>,
    transform: &dyn ContentTransform,
    offset: FixedOffset,
) {
    for section in timeline.sections() {
        println!("---- {} ----", section.label);

        let mut idx = 0;
        while idx < section.clusters.len() {
            let collapsed = section
                .system_runs
                .iter()
                .find(|run| run.clusters.start == idx && !timeline.is_run_expanded(run.key));
            if let Some(run) = collapsed {
                let count: usize = section.clusters[run.clusters.clone()]
                    .iter()
                    .map(|c| c.messages.len())
                    .sum();
                println!("  [{} system messages, collapsed]", count);
                idx = run.clusters.end;
                continue;
            }
            print_cluster(timeline, &section.clusters[idx], registry, transform, offset);
            idx += 1;
        }
    }
}

fn print_cluster<K: ReceiptSink>(
    timeline: &Timeline<K>,
    cluster: &Cluster,
    registry: &RenderRegistry<String>,
    transform: &dyn ContentTransform,
    offset: FixedOffset,
) {
    if let (false, Some(first)) = (cluster.is_system(), cluster.messages.first()) {
        let mut sender = cluster.sender_id.to_string();
        sender.truncate(8);
        let you = if cluster.sender_id == timeline.viewer().user_id {
            " (you)"
        } else {
            ""
        };
        println!(
            "  {}{}  {}",
            sender,
            you,
            first.created_at.with_timezone(&offset).format("%H:%M")
        );
    }

    let bearer = cluster.status_bearer();
    for message in &cluster.messages {
        let body = display_body(transform, message);
        let line = match registry.render(message, &body) {
            Rendered::Ready(line) => line,
            Rendered::Unsupported { kind, .. } => format!("[unsupported {:?} message]", kind),
            Rendered::Failed { reason, .. } => format!("[could not display: {}]", reason),
        };

        let mut marks = String::new();
        if message.is_pinned {
            marks.push_str("(pinned) ");
        }
        if message.is_favorite {
            marks.push_str("(fav) ");
        }
        let reactions: Vec<String> = message
            .reactions
            .iter()
            .map(|r| format!("{} {}", r.emoji, r.count))
            .collect();
        let reactions = if reactions.is_empty() {
            String::new()
        } else {
            format!("  [{}]", reactions.join(", "))
        };
        println!("    #{} {}{}{}", message.id, marks, line, reactions);

        if Some(message.id) == bearer && message.sender_id == timeline.viewer().user_id {
            let seen = message
                .statuses
                .iter()
                .filter(|s| s.state == DeliveryState::Seen)
                .count();
            if seen > 0 {
                println!("      seen by {}", seen);
            }
        }
    }
}
