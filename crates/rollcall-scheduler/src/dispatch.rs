//! Prompt dispatch: composes the roll-call prompt and sends it.
//! Poll channel: announcement with mentions, then the poll. A bridge that
//! cannot create polls gets a reaction prompt instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::config::ResponseChannelKind;
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::MessageTransport;
use rollcall_core::types::{OutgoingMessage, Participant, PollRequest};

use crate::channel::{POLL_OPTIONS, ResponseChannel};
use crate::report::{format_date, weekday_name};

/// What was sent for a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Message answers attach to (the poll, or the prompt itself).
    pub correlation_id: String,
    pub channel: ResponseChannelKind,
    pub sent_at: DateTime<Utc>,
}

/// Sends prompts over a message transport.
pub struct PromptDispatcher {
    transport: Arc<dyn MessageTransport>,
    poll_delay: Duration,
    /// "HH:MM" shown as the answer deadline.
    deadline: String,
}

impl PromptDispatcher {
    pub fn new(transport: Arc<dyn MessageTransport>, poll_delay: Duration, deadline: String) -> Self {
        Self {
            transport,
            poll_delay,
            deadline,
        }
    }

    /// Send the prompt for `group`, mentioning every member of `roster`.
    pub async fn dispatch(
        &self,
        group: &str,
        roster: &[Participant],
        channel: ResponseChannel,
        today: NaiveDate,
    ) -> Result<Dispatched> {
        let failed = |e: RollCallError| RollCallError::DispatchFailed {
            group: group.to_string(),
            reason: e.to_string(),
        };
        let mentions: Vec<String> = roster.iter().map(|p| p.id.clone()).collect();
        let text = compose_prompt(channel, today, &self.deadline, roster);
        let announcement = OutgoingMessage::text(group, text).with_mentions(mentions);

        let sent = self.transport.send_message(&announcement).await.map_err(failed)?;
        tracing::info!("📋 Prompt sent to {} ({} members, {})", group, roster.len(), channel.kind());

        if channel != ResponseChannel::Poll {
            return Ok(Dispatched {
                correlation_id: sent.id,
                channel: channel.kind(),
                sent_at: sent.timestamp,
            });
        }

        tokio::time::sleep(self.poll_delay).await;

        let poll = PollRequest {
            question: format!("📊 Tiragem de Falta - {}", format_date(today)),
            options: POLL_OPTIONS.iter().map(|o| o.to_string()).collect(),
            allow_multiple: false,
        };
        match self.transport.send_poll(group, &poll).await {
            Ok(poll_sent) => {
                tracing::info!("📊 Poll sent to {}", group);
                Ok(Dispatched {
                    correlation_id: poll_sent.id,
                    channel: ResponseChannelKind::Poll,
                    sent_at: poll_sent.timestamp,
                })
            }
            Err(e) => {
                if e.is_poll_unsupported() {
                    tracing::warn!("⚠️ Polls unsupported for {}, falling back to reactions", group);
                } else {
                    tracing::warn!("⚠️ Poll failed for {} ({}), falling back to reactions", group, e);
                }
                let fallback = OutgoingMessage::text(group, compose_reaction_fallback(today));
                let sent = self.transport.send_message(&fallback).await.map_err(failed)?;
                Ok(Dispatched {
                    correlation_id: sent.id,
                    channel: ResponseChannelKind::Reaction,
                    sent_at: sent.timestamp,
                })
            }
        }
    }
}

fn reaction_legend() -> &'static str {
    "✅ = Presente\n❌ = Ausente\n🏥 = Atestado/Justificativa"
}

fn instructions(channel: ResponseChannel) -> String {
    match channel {
        ResponseChannel::Poll => "👇 Responda a enquete abaixo:".to_string(),
        ResponseChannel::Reaction => format!("👇 Reaja a esta mensagem:\n\n{}", reaction_legend()),
        ResponseChannel::Text => {
            "👇 Responda com *1* ou *presente* (ou responda citando esta mensagem).".to_string()
        }
    }
}

/// Prompt text: header, date, instructions, deadline and mentions.
pub fn compose_prompt(
    channel: ResponseChannel,
    today: NaiveDate,
    deadline: &str,
    roster: &[Participant],
) -> String {
    let handles: Vec<String> = roster.iter().map(|p| format!("@{}", p.handle)).collect();
    format!(
        "📋 *TIRAGEM DE FALTA* 📋\n\n\
         📅 *{}* - {}\n\n\
         {}\n\n\
         ⏰ Você tem até {} para responder!\n\n\
         👥 *Atenção todos:*\n{}",
        weekday_name(today),
        format_date(today),
        instructions(channel),
        deadline,
        handles.join(" ")
    )
}

/// Sent instead of the poll when the poll cannot be created.
pub fn compose_reaction_fallback(today: NaiveDate) -> String {
    format!(
        "📊 *Tiragem de Falta - {}*\n\nReaja a esta mensagem:\n\n{}",
        format_date(today),
        reaction_legend()
    )
}
