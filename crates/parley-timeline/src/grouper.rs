use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use chrono::{Days, FixedOffset, NaiveDate, Utc};

use parley_types::{Message, MessageId, MessageKind, UserId};

/// Viewer-local calendar used to bucket messages into days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupContext {
    pub offset: FixedOffset,
    pub today: NaiveDate,
}

impl GroupContext {
    pub fn new(offset: FixedOffset, today: NaiveDate) -> Self {
        Self { offset, today }
    }

    /// Context for the current wall-clock day in `offset`.
    pub fn now(offset: FixedOffset) -> Self {
        Self {
            offset,
            today: Utc::now().with_timezone(&offset).date_naive(),
        }
    }

    pub fn day_of(&self, message: &Message) -> NaiveDate {
        message.created_at.with_timezone(&self.offset).date_naive()
    }

    pub fn label_for(&self, day: NaiveDate) -> DayLabel {
        if day == self.today {
            DayLabel::Today
        } else if self.today.checked_sub_days(Days::new(1)) == Some(day) {
            DayLabel::Yesterday
        } else {
            DayLabel::Date(day)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            Self::Date(day) => write!(f, "{}", day.format("%B %-d, %Y")),
        }
    }
}

/// Consecutive messages rendered under one sender header.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub sender_id: UserId,
    pub messages: Vec<Message>,
}

impl Cluster {
    /// The message that carries the cluster's send-status indicator.
    pub fn status_bearer(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }

    /// The message that shows the sender name and avatar.
    pub fn header(&self) -> Option<MessageId> {
        self.messages.first().map(|m| m.id)
    }

    pub fn is_system(&self) -> bool {
        self.messages
            .first()
            .is_some_and(|m| m.kind == MessageKind::System)
    }
}

/// Two or more adjacent system-message clusters that render collapsed.
/// `key` is the first message id; expansion state is looked up by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRun {
    pub key: MessageId,
    pub clusters: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub day: NaiveDate,
    pub label: DayLabel,
    pub clusters: Vec<Cluster>,
    pub system_runs: Vec<SystemRun>,
}

impl Section {
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.clusters.iter().flat_map(|c| c.messages.iter())
    }
}

/// Whether `next` continues the cluster that `prev` belongs to.
pub fn same_cluster(prev: &Message, next: &Message) -> bool {
    prev.sender_id == next.sender_id
        && !prev.kind.is_special()
        && !next.kind.is_special()
        && minute_of(prev) == minute_of(next)
}

fn minute_of(message: &Message) -> i64 {
    message.created_at.timestamp().div_euclid(60)
}

/// Partition a message list into day sections and sender clusters.
///
/// Pure: the output depends only on `messages` and `ctx`. Sections appear in
/// the order their first message does; a day seen again later in the input
/// extends its existing section.
pub fn group<'a, I>(messages: I, ctx: &GroupContext) -> Vec<Section>
where
    I: IntoIterator<Item = &'a Message>,
{
    let mut sections: Vec<Section> = Vec::new();
    let mut by_day: HashMap<NaiveDate, usize> = HashMap::new();

    for message in messages {
        let day = ctx.day_of(message);
        let idx = *by_day.entry(day).or_insert_with(|| {
            sections.push(Section {
                day,
                label: ctx.label_for(day),
                clusters: Vec::new(),
                system_runs: Vec::new(),
            });
            sections.len() - 1
        });

        let section = &mut sections[idx];
        let continues = section
            .clusters
            .last()
            .and_then(|c| c.messages.last())
            .is_some_and(|prev| same_cluster(prev, message));
        match section.clusters.last_mut() {
            Some(cluster) if continues => cluster.messages.push(message.clone()),
            _ => section.clusters.push(Cluster {
                sender_id: message.sender_id,
                messages: vec![message.clone()],
            }),
        }
    }

    for section in &mut sections {
        section.system_runs = system_runs(&section.clusters);
    }
    sections
}

fn system_runs(clusters: &[Cluster]) -> Vec<SystemRun> {
    let mut runs = Vec::new();
    let mut start = 0;
    while start < clusters.len() {
        if !clusters[start].is_system() {
            start += 1;
            continue;
        }
        let mut end = start + 1;
        while end < clusters.len() && clusters[end].is_system() {
            end += 1;
        }
        if end - start >= 2 {
            if let Some(key) = clusters[start].header() {
                runs.push(SystemRun {
                    key,
                    clusters: start..end,
                });
            }
        }
        start = end;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use parley_types::ConversationId;
    use uuid::Uuid;

    const ALICE: Uuid = Uuid::from_u128(1);
    const BOB: Uuid = Uuid::from_u128(2);

    fn ctx() -> GroupContext {
        GroupContext::new(
            FixedOffset::east_opt(0).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        )
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, h, m, s).unwrap()
    }

    fn msg(id: i64, sender: Uuid, kind: MessageKind, created_at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId(id),
            conversation: ConversationId::Channel(Uuid::nil()),
            sender_id: sender,
            kind,
            content: String::new(),
            created_at,
            updated_at: created_at,
            parent_id: None,
            reactions: vec![],
            statuses: vec![],
            is_pinned: false,
            is_favorite: false,
        }
    }

    fn shape(sections: &[Section]) -> Vec<Vec<Vec<i64>>> {
        sections
            .iter()
            .map(|s| {
                s.clusters
                    .iter()
                    .map(|c| c.messages.iter().map(|m| m.id.0).collect())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn buckets_by_local_day_with_labels() {
        let messages = vec![
            msg(1, ALICE, MessageKind::Text, at(12, 10, 0, 0)),
            msg(2, ALICE, MessageKind::Text, at(14, 23, 59, 0)),
            msg(3, BOB, MessageKind::Text, at(15, 0, 1, 0)),
        ];
        let sections = group(&messages, &ctx());
        let labels: Vec<String> = sections.iter().map(|s| s.label.to_string()).collect();
        assert_eq!(labels, vec!["October 12, 2026", "Yesterday", "Today"]);
    }

    #[test]
    fn local_offset_moves_day_boundary() {
        // 23:30 UTC on the 14th is already the 15th at UTC+2
        let messages = vec![msg(1, ALICE, MessageKind::Text, at(14, 23, 30, 0))];
        let plus_two = GroupContext::new(
            FixedOffset::east_opt(2 * 3600).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        );
        assert_eq!(group(&messages, &plus_two)[0].label, DayLabel::Today);
        assert_eq!(group(&messages, &ctx())[0].label, DayLabel::Yesterday);
    }

    #[test]
    fn clusters_need_sender_minute_and_plain_kind() {
        let base = at(15, 9, 0, 5);
        let messages = vec![
            msg(1, ALICE, MessageKind::Text, base),
            msg(2, ALICE, MessageKind::Image, at(15, 9, 0, 50)),
            // different minute
            msg(3, ALICE, MessageKind::Text, at(15, 9, 1, 0)),
            // different sender, same minute
            msg(4, BOB, MessageKind::Text, at(15, 9, 1, 10)),
            // special kind breaks even with same sender and minute
            msg(5, BOB, MessageKind::Call, at(15, 9, 1, 20)),
            msg(6, BOB, MessageKind::Text, at(15, 9, 1, 30)),
        ];
        let sections = group(&messages, &ctx());
        assert_eq!(shape(&sections), vec![vec![vec![1, 2], vec![3], vec![4], vec![5], vec![6]]]);
        assert_eq!(sections[0].clusters[0].status_bearer(), Some(MessageId(2)));
        assert_eq!(sections[0].clusters[0].header(), Some(MessageId(1)));
    }

    #[test]
    fn every_message_in_exactly_one_cluster() {
        let messages: Vec<Message> = (0..30)
            .map(|i| {
                let sender = if i % 3 == 0 { BOB } else { ALICE };
                msg(i, sender, MessageKind::Text, at(13 + (i as u32 / 12), 8, i as u32 % 4, 0))
            })
            .collect();
        let sections = group(&messages, &ctx());
        let mut flattened: Vec<i64> = sections.iter().flat_map(|s| s.messages().map(|m| m.id.0)).collect();
        flattened.sort();
        assert_eq!(flattened, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn grouping_is_deterministic() {
        let messages: Vec<Message> = (0..10)
            .map(|i| msg(i, if i < 5 { ALICE } else { BOB }, MessageKind::Text, at(15, 9, 0, 0)))
            .collect();
        assert_eq!(group(&messages, &ctx()), group(&messages, &ctx()));
    }

    #[test]
    fn system_runs_of_two_or_more() {
        let t = at(15, 9, 0, 0);
        let messages = vec![
            msg(1, ALICE, MessageKind::System, t),
            msg(2, ALICE, MessageKind::System, t),
            msg(3, ALICE, MessageKind::System, t),
            msg(4, BOB, MessageKind::Text, t),
            msg(5, ALICE, MessageKind::System, t),
        ];
        let sections = group(&messages, &ctx());
        assert_eq!(
            sections[0].system_runs,
            vec![SystemRun {
                key: MessageId(1),
                clusters: 0..3
            }]
        );
    }

    #[test]
    fn empty_input_has_no_sections() {
        assert!(group(&Vec::<Message>::new(), &ctx()).is_empty());
    }
}
