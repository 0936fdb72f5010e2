//! Tally engine: reconciles the roster against the answers of a cycle.

use std::collections::HashMap;
use std::sync::Arc;

use rollcall_core::config::{ResponseChannelKind, RollCallSettings, UnansweredPolicy};
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::{MessageTransport, RosterAccessor};
use rollcall_core::types::{Classification, Participant, phone_of};

use crate::channel::ResponseChannel;
use crate::store::CycleStore;

/// Outcome bucket of a participant in a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Present,
    Absent,
    Excused,
    NoResponse,
}

impl From<Classification> for Bucket {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Present => Bucket::Present,
            Classification::Absent => Bucket::Absent,
            Classification::Excused => Bucket::Excused,
        }
    }
}

/// Partition of a group's roster for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyResult {
    pub group: String,
    pub channel: ResponseChannelKind,
    pub present: Vec<Participant>,
    pub absent: Vec<Participant>,
    pub excused: Vec<Participant>,
    pub no_response: Vec<Participant>,
    /// Participants that sent no signal at all. Under the `absent` policy
    /// they are also listed in `absent`.
    pub unanswered: Vec<Participant>,
}

impl TallyResult {
    /// Classify every roster member, in roster order.
    pub fn partition(
        group: &str,
        channel: ResponseChannelKind,
        roster: &[Participant],
        signals: &HashMap<String, Classification>,
        policy: UnansweredPolicy,
    ) -> Self {
        let by_phone: HashMap<&str, Classification> =
            signals.iter().map(|(id, c)| (phone_of(id), *c)).collect();

        let mut result = Self {
            group: group.to_string(),
            channel,
            present: Vec::new(),
            absent: Vec::new(),
            excused: Vec::new(),
            no_response: Vec::new(),
            unanswered: Vec::new(),
        };

        for participant in roster {
            let bucket = match by_phone.get(phone_of(&participant.id)) {
                Some(c) => Bucket::from(*c),
                None => {
                    result.unanswered.push(participant.clone());
                    match policy {
                        UnansweredPolicy::Absent => Bucket::Absent,
                        UnansweredPolicy::NoResponse => Bucket::NoResponse,
                    }
                }
            };
            let list = match bucket {
                Bucket::Present => &mut result.present,
                Bucket::Absent => &mut result.absent,
                Bucket::Excused => &mut result.excused,
                Bucket::NoResponse => &mut result.no_response,
            };
            list.push(participant.clone());
        }

        result
    }

    pub fn total(&self) -> usize {
        self.present.len() + self.absent.len() + self.excused.len() + self.no_response.len()
    }

    /// Participants that sent any signal.
    pub fn responded_count(&self) -> usize {
        self.total() - self.unanswered.len()
    }
}

/// Current roster of a group without the bot itself.
pub async fn eligible_roster(roster: &dyn RosterAccessor, group: &str) -> Result<Vec<Participant>> {
    let unavailable = |e: RollCallError| match e {
        RollCallError::RosterUnavailable { .. } => e,
        other => RollCallError::RosterUnavailable {
            group: group.to_string(),
            reason: other.to_string(),
        },
    };

    let me = roster.self_identity().await.map_err(unavailable)?;
    let members = roster.participants(group).await.map_err(unavailable)?;
    Ok(members
        .into_iter()
        .filter(|p| phone_of(&p.id) != phone_of(&me))
        .collect())
}

/// Computes tallies from history and the collected webhook answers.
pub struct TallyEngine {
    transport: Arc<dyn MessageTransport>,
    roster: Arc<dyn RosterAccessor>,
    store: Arc<CycleStore>,
    settings: RollCallSettings,
}

impl TallyEngine {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        roster: Arc<dyn RosterAccessor>,
        store: Arc<CycleStore>,
        settings: RollCallSettings,
    ) -> Self {
        Self {
            transport,
            roster,
            store,
            settings,
        }
    }

    /// Tally the live cycle of `group`.
    ///
    /// Fails with `NoCycle` when no prompt was sent and with
    /// `RosterUnavailable` when the roster cannot be read. A history read
    /// failure is logged and tallied as if nobody answered.
    pub async fn compute_tally(&self, group: &str) -> Result<TallyResult> {
        let cycle = self
            .store
            .cycle(group)
            .ok_or_else(|| RollCallError::NoCycle(group.to_string()))?;
        let roster = eligible_roster(self.roster.as_ref(), group).await?;

        let channel = ResponseChannel::from(cycle.channel);
        let mut signals = match channel
            .collect_responses(self.transport.as_ref(), &cycle, self.settings.history_window)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("⚠️ History unavailable for {}, tallying without it: {}", group, e);
                HashMap::new()
            }
        };

        // History is authoritative; webhook answers only fill in members
        // history does not show. Both sources are keyed by phone number.
        let live = self.store.responses_for(group);
        let from_history = signals.len();
        for (phone, classification) in live {
            signals.entry(phone).or_insert(classification);
        }
        tracing::debug!(
            "Tally {} via {}: {} from history, {} from webhook",
            group,
            self.transport.name(),
            from_history,
            signals.len() - from_history
        );

        let result = TallyResult::partition(
            group,
            cycle.channel,
            &roster,
            &signals,
            self.settings.unanswered_for(cycle.channel),
        );
        tracing::info!(
            "📊 Tally {}: {}/{} responded ({} present, {} absent, {} excused)",
            group,
            result.responded_count(),
            result.total(),
            result.present.len(),
            result.absent.len(),
            result.excused.len()
        );
        Ok(result)
    }
}
