//! Port Errors
//!
//! Failures raised by outbound collaborators (document store, geo provider).
//! The retry policy uses [`PortError::is_transient`] to decide whether an
//! attempt may be repeated.

/// Error returned by a document store or geo resolver call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("call timed out")]
    Timeout,
    #[error("throttled by upstream (status {0})")]
    Throttled(u16),
    #[error("upstream unavailable (status {0})")]
    Unavailable(u16),
    #[error("store busy: {0}")]
    Busy(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl PortError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Timeout
                | PortError::Throttled(_)
                | PortError::Unavailable(_)
                | PortError::Busy(_)
                | PortError::Transport(_)
        )
    }

    /// Classify an HTTP status code that is not a success.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            429 => PortError::Throttled(status),
            500..=599 => PortError::Unavailable(status),
            _ => PortError::Rejected {
                status,
                message: body.into(),
            },
        }
    }
}
