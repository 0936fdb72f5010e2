//! Domain types shared between the transport, the scheduler and the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A group member as reported by the roster accessor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Stable platform identity, e.g. `5511999990000@c.us`.
    pub id: String,
    /// Handle used in `@mentions` (the bare phone number on WhatsApp).
    pub handle: String,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let handle = phone_of(&id).to_string();
        Self { id, handle }
    }
}

/// Strip the `@server` suffix from a platform identity.
pub fn phone_of(id: &str) -> &str {
    id.split('@').next().unwrap_or(id)
}

/// Outcome a participant signalled for the live cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Present,
    Absent,
    Excused,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::Present => write!(f, "present"),
            Classification::Absent => write!(f, "absent"),
            Classification::Excused => write!(f, "excused"),
        }
    }
}

/// A single recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub participant: String,
    pub classification: Classification,
    pub at: DateTime<Utc>,
}

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadType {
    Direct,
    Group,
}

/// Message received from the platform (webhook delivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub thread_id: String,
    pub thread_name: Option<String>,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub thread_type: ThreadType,
    /// Sent by the bot's own account (from another device or by the bot itself).
    pub from_self: bool,
    pub timestamp: DateTime<Utc>,
    /// Id of the message this one quotes, if any.
    pub reply_to: Option<String>,
}

/// Message to send to a group or direct chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub thread_id: String,
    pub content: String,
    /// Identities rendered as mentions.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Quote this message id when replying.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    pub fn text(thread_id: &str, content: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_mentions(mut self, mentions: Vec<String>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn replying_to(mut self, message_id: &str) -> Self {
        self.reply_to = Some(message_id.to_string());
        self
    }
}

/// Handle of a message (or poll) the transport delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// Single-choice poll to create in a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// Everyone who applied one emoji to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub senders: Vec<String>,
}

/// One participant's current vote on a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollVote {
    pub sender: String,
    pub selected_options: Vec<String>,
}

/// Message read back from a group's recent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub sender_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub from_self: bool,
    #[serde(default)]
    pub is_poll: bool,
    #[serde(default)]
    pub reactions: Vec<ReactionGroup>,
    #[serde(default)]
    pub poll_votes: Vec<PollVote>,
    #[serde(default)]
    pub quoted_id: Option<String>,
}

/// Typed event pushed by the bridge webhook.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message(IncomingMessage),
    PollVote {
        group: String,
        poll_id: String,
        vote: PollVote,
        at: DateTime<Utc>,
    },
    Reaction {
        group: String,
        message_id: String,
        sender: String,
        emoji: String,
        at: DateTime<Utc>,
    },
}
