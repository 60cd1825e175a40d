use std::future::Future;

use futures_util::future::join_all;
use tracing::{info, warn};

use parley_types::{ConversationId, MessageId};

use crate::error::ActionError;

/// Per-message action requests. There is no multi-id endpoint; bulk actions
/// issue one request per message.
pub trait MessageActions {
    fn delete(
        &self,
        conversation: ConversationId,
        id: MessageId,
    ) -> impl Future<Output = Result<(), ActionError>>;

    fn forward(
        &self,
        id: MessageId,
        target: ConversationId,
    ) -> impl Future<Output = Result<(), ActionError>>;

    fn set_favorite(
        &self,
        id: MessageId,
        favorite: bool,
    ) -> impl Future<Output = Result<(), ActionError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
    Forward(ConversationId),
    Favorite(bool),
}

impl BulkAction {
    fn past_tense(&self) -> &'static str {
        match self {
            Self::Delete => "deleted",
            Self::Forward(_) => "forwarded",
            Self::Favorite(true) => "added to favorites",
            Self::Favorite(false) => "removed from favorites",
        }
    }
}

/// A bulk action ready to run, detached from the timeline so real-time
/// events can keep flowing while its requests are outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkPlan {
    pub epoch: u64,
    pub conversation: ConversationId,
    pub action: BulkAction,
    pub ids: Vec<MessageId>,
    /// Selected but not eligible (e.g. not deletable by the viewer)
    pub skipped: Vec<MessageId>,
}

#[derive(Debug)]
pub struct BulkOutcome {
    pub epoch: u64,
    pub action: BulkAction,
    pub succeeded: Vec<MessageId>,
    pub failed: Vec<(MessageId, ActionError)>,
    pub skipped: Vec<MessageId>,
}

impl BulkOutcome {
    /// User-facing failure notice, if anything failed.
    pub fn summary(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        Some(format!(
            "{} message(s) could not be {}",
            self.failed.len(),
            self.action.past_tense()
        ))
    }
}

/// Run every request of `plan` concurrently and settle them all. A failure
/// never blocks the other items.
pub async fn execute<A>(plan: BulkPlan, actions: &A) -> BulkOutcome
where
    A: MessageActions + ?Sized,
{
    let BulkPlan {
        epoch,
        conversation,
        action,
        ids,
        skipped,
    } = plan;

    let requests = ids.iter().map(|&id| async move {
        let result = match action {
            BulkAction::Delete => actions.delete(conversation, id).await,
            BulkAction::Forward(target) => actions.forward(id, target).await,
            BulkAction::Favorite(favorite) => actions.set_favorite(id, favorite).await,
        };
        (id, result)
    });

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (id, result) in join_all(requests).await {
        match result {
            Ok(()) => succeeded.push(id),
            Err(e) => {
                warn!(%id, ?action, "Bulk action item failed: {}", e);
                failed.push((id, e));
            }
        }
    }

    info!(
        ?action,
        succeeded = succeeded.len(),
        failed = failed.len(),
        skipped = skipped.len(),
        "Bulk action settled"
    );
    BulkOutcome {
        epoch,
        action,
        succeeded,
        failed,
        skipped,
    }
}
