//! In-memory transport for tests: scripted rosters, a per-group history
//! that records everything sent, and switchable failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::{MessageTransport, RosterAccessor};
use rollcall_core::types::{
    HistoryMessage, OutgoingMessage, Participant, PollRequest, PollVote, ReactionGroup,
    SentMessage,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fake bridge implementing both transport traits.
pub struct FakeTransport {
    self_id: String,
    rosters: Mutex<HashMap<String, Vec<Participant>>>,
    history: Mutex<HashMap<String, Vec<HistoryMessage>>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    polls: Mutex<Vec<(String, PollRequest)>>,
    failing_groups: Mutex<HashSet<String>>,
    polls_supported: AtomicBool,
    history_fails: AtomicBool,
    next_id: AtomicUsize,
}

impl FakeTransport {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            rosters: Mutex::default(),
            history: Mutex::default(),
            sent: Mutex::default(),
            polls: Mutex::default(),
            failing_groups: Mutex::default(),
            polls_supported: AtomicBool::new(true),
            history_fails: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn set_roster(&self, group: &str, ids: &[&str]) {
        let members = ids.iter().map(|id| Participant::new(*id)).collect();
        lock(&self.rosters).insert(group.to_string(), members);
    }

    pub fn push_history(&self, group: &str, message: HistoryMessage) {
        lock(&self.history).entry(group.to_string()).or_default().push(message);
    }

    /// Every send to `group` fails.
    pub fn fail_sends_to(&self, group: &str) {
        lock(&self.failing_groups).insert(group.to_string());
    }

    pub fn set_polls_supported(&self, supported: bool) {
        self.polls_supported.store(supported, Ordering::SeqCst);
    }

    pub fn fail_history(&self, fail: bool) {
        self.history_fails.store(fail, Ordering::SeqCst);
    }

    /// Add a reaction to a message already in history.
    pub fn react(&self, group: &str, message_id: &str, emoji: &str, sender: &str) {
        self.edit_message(group, message_id, |m| {
            match m.reactions.iter_mut().find(|r| r.emoji == emoji) {
                Some(existing) => existing.senders.push(sender.to_string()),
                None => m.reactions.push(ReactionGroup {
                    emoji: emoji.to_string(),
                    senders: vec![sender.to_string()],
                }),
            }
        });
    }

    /// Add a vote to a poll already in history.
    pub fn vote(&self, group: &str, poll_id: &str, sender: &str, option: &str) {
        self.edit_message(group, poll_id, |m| {
            m.poll_votes.push(PollVote {
                sender: sender.to_string(),
                selected_options: vec![option.to_string()],
            })
        });
    }

    fn edit_message(&self, group: &str, id: &str, edit: impl FnOnce(&mut HistoryMessage)) {
        let mut history = lock(&self.history);
        if let Some(m) = history
            .get_mut(group)
            .and_then(|msgs| msgs.iter_mut().find(|m| m.id == id))
        {
            edit(m);
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, group: &str) -> Vec<OutgoingMessage> {
        self.sent().into_iter().filter(|m| m.thread_id == group).collect()
    }

    pub fn polls(&self) -> Vec<(String, PollRequest)> {
        lock(&self.polls).clone()
    }

    fn check_group(&self, group: &str) -> Result<()> {
        if lock(&self.failing_groups).contains(group) {
            return Err(RollCallError::Channel(format!("send to {group} refused")));
        }
        Ok(())
    }

    fn record_own(&self, group: &str, body: &str, is_poll: bool) -> SentMessage {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let sent = SentMessage {
            id: format!("true_{group}_MSG{n}"),
            timestamp: Utc::now(),
        };
        self.push_history(
            group,
            HistoryMessage {
                id: sent.id.clone(),
                sender_id: self.self_id.clone(),
                body: body.to_string(),
                timestamp: sent.timestamp,
                from_self: true,
                is_poll,
                reactions: vec![],
                poll_votes: vec![],
                quoted_id: None,
            },
        );
        sent
    }
}

#[async_trait]
impl RosterAccessor for FakeTransport {
    async fn participants(&self, group: &str) -> Result<Vec<Participant>> {
        lock(&self.rosters)
            .get(group)
            .cloned()
            .ok_or_else(|| RollCallError::RosterUnavailable {
                group: group.to_string(),
                reason: "unknown group".into(),
            })
    }

    async fn self_identity(&self) -> Result<String> {
        Ok(self.self_id.clone())
    }
}

#[async_trait]
impl MessageTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<SentMessage> {
        self.check_group(&message.thread_id)?;
        lock(&self.sent).push(message.clone());
        Ok(self.record_own(&message.thread_id, &message.content, false))
    }

    async fn send_poll(&self, group: &str, poll: &PollRequest) -> Result<SentMessage> {
        self.check_group(group)?;
        if !self.polls_supported.load(Ordering::SeqCst) {
            return Err(RollCallError::PollUnsupported("fake bridge".into()));
        }
        lock(&self.polls).push((group.to_string(), poll.clone()));
        Ok(self.record_own(group, &poll.question, true))
    }

    async fn fetch_recent_messages(&self, group: &str, limit: usize) -> Result<Vec<HistoryMessage>> {
        if self.history_fails.load(Ordering::SeqCst) {
            return Err(RollCallError::HistoryFetchFailed {
                group: group.to_string(),
                reason: "scripted failure".into(),
            });
        }
        let history = lock(&self.history).get(group).cloned().unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }
}
