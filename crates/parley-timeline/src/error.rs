use parley_types::MessageId;
use thiserror::Error;

/// Page fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned status {status}")]
    Status { status: u16 },

    #[error("malformed page: {0}")]
    Decode(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Transport errors, timeouts, throttling and 5xx are worth another try.
    /// Decode failures and other client errors will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status } => *status >= 500 || *status == 408 || *status == 429,
            Self::Decode(_) | Self::Exhausted { .. } => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// One item of a bulk action failed.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("message {0} no longer exists")]
    NotFound(MessageId),

    #[error("not allowed to act on message {0}")]
    Forbidden(MessageId),

    #[error("request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

#[derive(Debug, Error)]
#[error("content transform failed: {0}")]
pub struct TransformError(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} must be {expected}")]
    OutOfRange {
        var: &'static str,
        expected: &'static str,
    },
}
