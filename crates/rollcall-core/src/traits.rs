//! Transport seams. The scheduler only sees these traits; the WhatsApp bridge
//! client in `rollcall-channels` implements both.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{HistoryMessage, OutgoingMessage, Participant, PollRequest, SentMessage};

/// Live membership of groups.
#[async_trait]
pub trait RosterAccessor: Send + Sync {
    /// Current members of a group, in platform order. Includes the bot itself.
    async fn participants(&self, group: &str) -> Result<Vec<Participant>>;

    /// Identity of the account the bot is logged in as.
    async fn self_identity(&self) -> Result<String>;
}

/// Outbound messages and history reads.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage>;

    /// Create a poll. Returns `RollCallError::PollUnsupported` when the
    /// platform cannot create polls.
    async fn send_poll(&self, group: &str, poll: &PollRequest) -> Result<SentMessage>;

    /// The most recent `limit` messages of a group, oldest first.
    async fn fetch_recent_messages(&self, group: &str, limit: usize)
    -> Result<Vec<HistoryMessage>>;
}
