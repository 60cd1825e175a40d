use std::path::Path;

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use serde::Deserialize;
use uuid::Uuid;

use parley_timeline::{ChannelRole, GroupContext, ViewerContext};
use parley_types::{ConversationId, Message, MessageId, RealtimeEvent};

/// A recorded conversation to replay through the timeline.
///
/// `messages` is the full history served page by page (ignored when a live
/// server is configured); `events` are applied after the history is loaded.
#[derive(Debug, Deserialize)]
pub struct Script {
    pub viewer: Uuid,
    #[serde(default)]
    pub admin: bool,
    pub conversation: ConversationId,
    #[serde(default)]
    pub unread: u32,
    /// Viewer's UTC offset in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Pin "today" for reproducible day labels
    #[serde(default)]
    pub today: Option<NaiveDate>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub events: Vec<RealtimeEvent>,
    /// System runs to show expanded, by their first message id
    #[serde(default)]
    pub expand_runs: Vec<MessageId>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut script: Script = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        script.messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(script)
    }

    pub fn viewer(&self) -> ViewerContext {
        ViewerContext {
            user_id: self.viewer,
            role: if self.admin {
                ChannelRole::Admin
            } else {
                ChannelRole::Member
            },
        }
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).context("utc_offset_minutes out of range")
    }

    pub fn group_context(&self) -> Result<GroupContext> {
        let offset = self.offset()?;
        Ok(match self.today {
            Some(today) => GroupContext::new(offset, today),
            None => GroupContext::now(offset),
        })
    }
}
