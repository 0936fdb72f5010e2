//! Response channels: how an answer is recognised for each way of
//! responding to the prompt (poll vote, emoji reaction, text reply).

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rollcall_core::config::ResponseChannelKind;
use rollcall_core::error::Result;
use rollcall_core::traits::MessageTransport;
use rollcall_core::types::{Classification, HistoryMessage, InboundEvent, PollVote, phone_of};

use crate::store::Cycle;

/// Upper bound on the history window scanned at tally time.
pub const HISTORY_WINDOW: usize = 100;

/// Text every prompt carries; used to find it again when its id is unknown.
pub const PROMPT_MARKER: &str = "Tiragem de Falta";

/// Poll options, in display order.
pub const POLL_OPTIONS: [&str; 3] = ["✅ Presente", "❌ Ausente", "🏥 Atestado/Justificativa"];

/// Emoji → classification for the reaction channel.
pub const REACTION_EMOJIS: [(&str, Classification); 3] = [
    ("✅", Classification::Present),
    ("❌", Classification::Absent),
    ("🏥", Classification::Excused),
];

/// Literal replies that count as present on the text channel.
const PRESENT_WORDS: [&str; 3] = ["1", "presente", "present"];

/// How far before the cycle start the history fallback still accepts a prompt.
const FALLBACK_SLACK_SECS: i64 = 60;

/// Map a poll option label to a classification by keyword.
pub fn classify_option(option: &str) -> Option<Classification> {
    let lower = option.to_lowercase();
    if lower.contains("presente") {
        Some(Classification::Present)
    } else if lower.contains("ausente") {
        Some(Classification::Absent)
    } else if lower.contains("atestado") || lower.contains("justificativa") {
        Some(Classification::Excused)
    } else {
        None
    }
}

/// First recognised option of a vote; an empty selection is a retracted vote.
pub fn classify_vote(vote: &PollVote) -> Option<Classification> {
    vote.selected_options.iter().find_map(|o| classify_option(o))
}

/// Map a reaction emoji, ignoring variation selectors and skin tones.
pub fn classify_emoji(emoji: &str) -> Option<Classification> {
    let base: String = emoji
        .chars()
        .filter(|c| *c != '\u{FE0F}' && !('\u{1F3FB}'..='\u{1F3FF}').contains(c))
        .collect();
    REACTION_EMOJIS
        .iter()
        .find(|(e, _)| *e == base)
        .map(|(_, c)| *c)
}

/// Whether a free-text reply is one of the recognised "present" literals.
pub fn is_present_reply(body: &str) -> bool {
    let text = body.trim().to_lowercase();
    PRESENT_WORDS.contains(&text.as_str())
}

/// A participant's answer as seen by one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Answer {
        participant: String,
        classification: Classification,
        at: DateTime<Utc>,
    },
    /// The participant took their answer back.
    Retract { participant: String },
}

/// The configured response channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseChannel {
    Poll,
    Reaction,
    Text,
}

impl From<ResponseChannelKind> for ResponseChannel {
    fn from(kind: ResponseChannelKind) -> Self {
        match kind {
            ResponseChannelKind::Poll => ResponseChannel::Poll,
            ResponseChannelKind::Reaction => ResponseChannel::Reaction,
            ResponseChannelKind::Text => ResponseChannel::Text,
        }
    }
}

impl ResponseChannel {
    pub fn kind(&self) -> ResponseChannelKind {
        match self {
            ResponseChannel::Poll => ResponseChannelKind::Poll,
            ResponseChannel::Reaction => ResponseChannelKind::Reaction,
            ResponseChannel::Text => ResponseChannelKind::Text,
        }
    }

    /// Read the answers for a cycle back from the group's recent history.
    ///
    /// `window` is clamped to [`HISTORY_WINDOW`].
    pub async fn collect_responses(
        &self,
        transport: &dyn MessageTransport,
        cycle: &Cycle,
        window: usize,
    ) -> Result<HashMap<String, Classification>> {
        let limit = window.clamp(1, HISTORY_WINDOW);
        let history = transport.fetch_recent_messages(&cycle.group, limit).await?;
        Ok(self.responses_from_history(&history, cycle))
    }

    /// Pure part of [`collect_responses`](Self::collect_responses).
    /// Keys are phone numbers.
    pub fn responses_from_history(
        &self,
        history: &[HistoryMessage],
        cycle: &Cycle,
    ) -> HashMap<String, Classification> {
        let mut found = HashMap::new();

        match self {
            ResponseChannel::Poll => {
                let Some(prompt) = locate_prompt(history, cycle, true) else {
                    tracing::warn!("⚠️ Poll for {} not found in recent history", cycle.group);
                    return found;
                };
                for vote in &prompt.poll_votes {
                    if let Some(classification) = classify_vote(vote) {
                        found.insert(phone_of(&vote.sender).to_string(), classification);
                    }
                }
            }
            ResponseChannel::Reaction => {
                let Some(prompt) = locate_prompt(history, cycle, false) else {
                    tracing::warn!("⚠️ Prompt for {} not found in recent history", cycle.group);
                    return found;
                };
                // Earlier emojis take precedence when someone reacted with several.
                for (emoji, classification) in REACTION_EMOJIS.iter().rev() {
                    let groups = prompt
                        .reactions
                        .iter()
                        .filter(|g| classify_emoji(&g.emoji) == Some(*classification));
                    for group in groups {
                        tracing::trace!("{} reactions on prompt: {}", emoji, group.senders.len());
                        for sender in &group.senders {
                            found.insert(phone_of(sender).to_string(), *classification);
                        }
                    }
                }
            }
            ResponseChannel::Text => {
                for msg in history.iter().filter(|m| !m.from_self && m.timestamp > cycle.prompt_at) {
                    let quotes_prompt = msg.quoted_id.as_deref() == Some(cycle.correlation_id.as_str());
                    if quotes_prompt || is_present_reply(&msg.body) {
                        found.insert(phone_of(&msg.sender_id).to_string(), Classification::Present);
                    }
                }
            }
        }

        found
    }

    /// Turn a live webhook event into a signal for this cycle, if it is one.
    pub fn signal_from_event(&self, event: &InboundEvent, cycle: &Cycle) -> Option<Signal> {
        match (self, event) {
            (ResponseChannel::Poll, InboundEvent::PollVote { group, poll_id, vote, at }) => {
                if group != &cycle.group || !correlates(poll_id, cycle) {
                    return None;
                }
                Some(match classify_vote(vote) {
                    Some(classification) => Signal::Answer {
                        participant: vote.sender.clone(),
                        classification,
                        at: *at,
                    },
                    None => Signal::Retract {
                        participant: vote.sender.clone(),
                    },
                })
            }
            (
                ResponseChannel::Reaction,
                InboundEvent::Reaction { group, message_id, sender, emoji, at },
            ) => {
                if group != &cycle.group || !correlates(message_id, cycle) {
                    return None;
                }
                if emoji.is_empty() {
                    return Some(Signal::Retract {
                        participant: sender.clone(),
                    });
                }
                classify_emoji(emoji).map(|classification| Signal::Answer {
                    participant: sender.clone(),
                    classification,
                    at: *at,
                })
            }
            (ResponseChannel::Text, InboundEvent::Message(msg)) => {
                if msg.thread_id != cycle.group || msg.from_self || msg.timestamp <= cycle.prompt_at {
                    return None;
                }
                let quotes_prompt = msg.reply_to.as_deref() == Some(cycle.correlation_id.as_str());
                (quotes_prompt || is_present_reply(&msg.content)).then(|| Signal::Answer {
                    participant: msg.sender_id.clone(),
                    classification: Classification::Present,
                    at: msg.timestamp,
                })
            }
            _ => None,
        }
    }
}

/// An event without a target id is attributed to the live cycle.
fn correlates(target_id: &str, cycle: &Cycle) -> bool {
    target_id.is_empty() || target_id == cycle.correlation_id
}

/// Find the cycle's prompt in history: by id first, then the newest
/// own message that looks like a prompt and is not older than the cycle.
fn locate_prompt<'a>(
    history: &'a [HistoryMessage],
    cycle: &Cycle,
    want_poll: bool,
) -> Option<&'a HistoryMessage> {
    if let Some(exact) = history.iter().find(|m| m.id == cycle.correlation_id) {
        return Some(exact);
    }

    let earliest = cycle.created_at - Duration::seconds(FALLBACK_SLACK_SECS);
    let fallback = history.iter().rev().find(|m| {
        m.from_self
            && m.timestamp >= earliest
            && if want_poll {
                m.is_poll
            } else {
                m.body.contains(PROMPT_MARKER) || m.body.contains(&PROMPT_MARKER.to_uppercase())
            }
    });
    if let Some(m) = fallback {
        tracing::debug!("Prompt for {} matched by fallback scan ({})", cycle.group, m.id);
    }
    fallback
}
