use std::cell::{Cell, RefCell};
use std::future::Future;

use tracing::{debug, warn};

use parley_types::{ConversationId, Message, Page, PageRequest};

use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::store::Direction;

/// Request/response page collaborator.
pub trait PageSource {
    fn fetch_page(&self, request: &PageRequest) -> impl Future<Output = Result<Page, FetchError>>;
}

/// Identity of one issued fetch. Results are only applied when the ticket
/// still matches the open conversation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub conversation: ConversationId,
    pub epoch: u64,
    pub direction: Direction,
    pub request: PageRequest,
}

/// Fetch with bounded exponential backoff. Non-retryable errors return
/// immediately; exhausting the attempts wraps the last error.
pub async fn fetch_with_retry<S>(
    source: &S,
    request: &PageRequest,
    policy: &RetryPolicy,
) -> Result<Page, FetchError>
where
    S: PageSource + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match source.fetch_page(request).await {
            Ok(page) => return Ok(page),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                warn!(conversation = %request.conversation, offset = request.offset, attempt, "Page fetch giving up: {}", e);
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    conversation = %request.conversation,
                    offset = request.offset,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Page fetch failed, retrying: {}",
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// In-memory page source over a full message history.
///
/// Offsets count back from the newest message, like the server's. Can be
/// told to fail the next N requests, and records every request it serves.
#[derive(Debug, Default)]
pub struct MemorySource {
    messages: Vec<Message>,
    failures: Cell<u32>,
    failure_status: Cell<u16>,
    requests: RefCell<Vec<PageRequest>>,
}

impl MemorySource {
    /// `messages` must be in ascending `created_at` order.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            failures: Cell::new(0),
            failure_status: Cell::new(503),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, count: u32, status: u16) {
        self.failures.set(count);
        self.failure_status.set(status);
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.borrow().clone()
    }

    fn matches(message: &Message, request: &PageRequest) -> bool {
        if message.conversation != request.conversation {
            return false;
        }
        request.filter.is_none_or(|filter| filter.matches(message))
    }
}

impl PageSource for MemorySource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        self.requests.borrow_mut().push(request.clone());

        let failures = self.failures.get();
        if failures > 0 {
            self.failures.set(failures - 1);
            return Err(FetchError::Status {
                status: self.failure_status.get(),
            });
        }

        let matching: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| Self::matches(m, request))
            .collect();
        let total = matching.len();
        let end = total.saturating_sub(request.offset as usize);
        let start = end.saturating_sub(request.limit as usize);
        let messages: Vec<Message> = matching[start..end].iter().map(|m| (*m).clone()).collect();

        debug!(offset = request.offset, served = messages.len(), total, "Serving page");
        Ok(Page {
            next_offset: request.offset + messages.len() as u32,
            has_more: start > 0,
            total_count: total as u32,
            messages,
        })
    }
}
