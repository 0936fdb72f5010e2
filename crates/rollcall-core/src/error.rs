//! Error type shared by every roll-call crate.

use thiserror::Error;

/// Errors raised across the roll-call workspace.
#[derive(Debug, Error)]
pub enum RollCallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The participant list of a group could not be fetched.
    #[error("Roster unavailable for {group}: {reason}")]
    RosterUnavailable { group: String, reason: String },

    /// The roll-call prompt could not be sent.
    #[error("Prompt dispatch failed for {group}: {reason}")]
    DispatchFailed { group: String, reason: String },

    /// The platform rejected a structured poll. Callers fall back to text.
    #[error("Polls not supported: {0}")]
    PollUnsupported(String),

    #[error("History fetch failed for {group}: {reason}")]
    HistoryFetchFailed { group: String, reason: String },

    /// A tally was requested for a group that has no live cycle.
    #[error("No live roll-call cycle for group {0}")]
    NoCycle(String),
}

impl RollCallError {
    /// Whether this error is the recoverable "polls unsupported" case.
    pub fn is_poll_unsupported(&self) -> bool {
        matches!(self, RollCallError::PollUnsupported(_))
    }
}

pub type Result<T> = std::result::Result<T, RollCallError>;
