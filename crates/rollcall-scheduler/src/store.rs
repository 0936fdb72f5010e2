//! In-memory cycle registry: one live roll call per group.
//! Holds the prompt correlation id and the responses collected from the
//! webhook feed. Nothing here survives a restart; the next prompt phase
//! starts clean.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rollcall_core::config::ResponseChannelKind;
use rollcall_core::types::{Classification, Response, phone_of};

/// One day's roll call for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub group: String,
    /// Id of the prompt message (or poll) answers attach to.
    pub correlation_id: String,
    /// Channel actually used; a failed poll falls back to reactions.
    pub channel: ResponseChannelKind,
    /// When the prompt was sent, per the transport.
    pub prompt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct CycleState {
    cycle: Cycle,
    /// Keyed by phone number; the bridge spells one member with several
    /// server suffixes.
    responses: HashMap<String, Response>,
}

/// Owned registry of live cycles, shared by the scheduler, the tally
/// engine and the webhook ingestion path.
#[derive(Debug, Default)]
pub struct CycleStore {
    cycles: RwLock<HashMap<String, CycleState>>,
}

impl CycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle, discarding the previous one and its responses.
    /// Returns the replaced cycle, if any.
    pub fn start_cycle(&self, cycle: Cycle) -> Option<Cycle> {
        tracing::debug!(
            "📋 Cycle started for {} (correlation={}, channel={})",
            cycle.group,
            cycle.correlation_id,
            cycle.channel
        );
        let mut cycles = self.cycles.write().unwrap_or_else(PoisonError::into_inner);
        cycles
            .insert(
                cycle.group.clone(),
                CycleState {
                    cycle,
                    responses: HashMap::new(),
                },
            )
            .map(|old| old.cycle)
    }

    /// Drop a group's cycle and responses. Returns whether one existed.
    pub fn clear(&self, group: &str) -> bool {
        let mut cycles = self.cycles.write().unwrap_or_else(PoisonError::into_inner);
        cycles.remove(group).is_some()
    }

    pub fn cycle(&self, group: &str) -> Option<Cycle> {
        let cycles = self.cycles.read().unwrap_or_else(PoisonError::into_inner);
        cycles.get(group).map(|s| s.cycle.clone())
    }

    /// Groups with a live cycle.
    pub fn live_groups(&self) -> Vec<String> {
        let cycles = self.cycles.read().unwrap_or_else(PoisonError::into_inner);
        let mut groups: Vec<String> = cycles.keys().cloned().collect();
        groups.sort();
        groups
    }

    /// Record a participant's answer for the group's live cycle.
    ///
    /// The latest answer replaces any earlier one. An event stamped before
    /// the stored answer arrived out of order and is dropped. Returns
    /// `false` when the group has no live cycle.
    pub fn record_response(
        &self,
        group: &str,
        participant: &str,
        classification: Classification,
        at: DateTime<Utc>,
    ) -> bool {
        let mut cycles = self.cycles.write().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = cycles.get_mut(group) else {
            return false;
        };

        let key = phone_of(participant);
        if let Some(existing) = state.responses.get(key) {
            if existing.at > at {
                tracing::debug!("Stale response from {} in {} ignored", participant, group);
                return true;
            }
        }

        state.responses.insert(
            key.to_string(),
            Response {
                participant: participant.to_string(),
                classification,
                at,
            },
        );
        true
    }

    /// Forget a participant's answer (e.g. a removed reaction).
    pub fn retract_response(&self, group: &str, participant: &str) -> bool {
        let mut cycles = self.cycles.write().unwrap_or_else(PoisonError::into_inner);
        cycles
            .get_mut(group)
            .and_then(|s| s.responses.remove(phone_of(participant)))
            .is_some()
    }

    /// Snapshot of phone number → classification for the live cycle.
    /// Empty when the group has no cycle.
    pub fn responses_for(&self, group: &str) -> HashMap<String, Classification> {
        let cycles = self.cycles.read().unwrap_or_else(PoisonError::into_inner);
        cycles
            .get(group)
            .map(|s| {
                s.responses
                    .iter()
                    .map(|(p, r)| (p.clone(), r.classification))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cycle(group: &str, id: &str) -> Cycle {
        let now = Utc::now();
        Cycle {
            group: group.into(),
            correlation_id: id.into(),
            channel: ResponseChannelKind::Poll,
            prompt_at: now,
            created_at: now,
        }
    }

    #[test]
    fn test_last_write_wins() {
        let store = CycleStore::new();
        store.start_cycle(cycle("g", "P1"));
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);

        assert!(store.record_response("g", "p", Classification::Absent, t1));
        assert!(store.record_response("g", "p", Classification::Present, t2));
        assert_eq!(store.responses_for("g")["p"], Classification::Present);
    }

    #[test]
    fn test_out_of_order_event_dropped() {
        let store = CycleStore::new();
        store.start_cycle(cycle("g", "P1"));
        let t1 = Utc::now();
        let t0 = t1 - Duration::seconds(5);

        store.record_response("g", "p", Classification::Present, t1);
        store.record_response("g", "p", Classification::Absent, t0);
        assert_eq!(store.responses_for("g")["p"], Classification::Present);
    }

    #[test]
    fn test_no_live_cycle() {
        let store = CycleStore::new();
        assert!(!store.record_response("g", "p", Classification::Present, Utc::now()));
        assert!(store.responses_for("g").is_empty());
        assert!(store.cycle("g").is_none());
    }

    #[test]
    fn test_new_cycle_discards_responses() {
        let store = CycleStore::new();
        store.start_cycle(cycle("g", "P1"));
        store.record_response("g", "p", Classification::Present, Utc::now());

        let replaced = store.start_cycle(cycle("g", "P2"));
        assert_eq!(replaced.map(|c| c.correlation_id).as_deref(), Some("P1"));
        assert!(store.responses_for("g").is_empty());
        assert_eq!(store.cycle("g").unwrap().correlation_id, "P2");
    }

    #[test]
    fn test_groups_are_isolated() {
        let store = CycleStore::new();
        store.start_cycle(cycle("a", "PA"));
        store.start_cycle(cycle("b", "PB"));
        store.record_response("a", "p", Classification::Excused, Utc::now());

        assert_eq!(store.responses_for("a").len(), 1);
        assert!(store.responses_for("b").is_empty());
        assert_eq!(store.live_groups(), vec!["a", "b"]);

        assert!(store.clear("a"));
        assert!(!store.clear("a"));
        assert_eq!(store.live_groups(), vec!["b"]);
    }

    #[test]
    fn test_server_suffixes_share_one_answer() {
        let store = CycleStore::new();
        store.start_cycle(cycle("g", "P1"));
        let t1 = Utc::now();

        store.record_response("g", "5511900000001@c.us", Classification::Present, t1);
        store.record_response("g", "5511900000001@s.whatsapp.net", Classification::Excused, t1 + Duration::seconds(1));

        let answers = store.responses_for("g");
        assert_eq!(answers.len(), 1);
        assert_eq!(answers["5511900000001"], Classification::Excused);

        assert!(store.retract_response("g", "5511900000001@c.us"));
        assert!(store.responses_for("g").is_empty());
    }

    #[test]
    fn test_retract() {
        let store = CycleStore::new();
        store.start_cycle(cycle("g", "P1"));
        store.record_response("g", "p", Classification::Present, Utc::now());
        assert!(store.retract_response("g", "p"));
        assert!(!store.retract_response("g", "p"));
        assert!(store.responses_for("g").is_empty());
    }
}
