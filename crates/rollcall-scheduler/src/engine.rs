//! Cycle scheduler: prompt and result phases, plus the timer loop that
//! fires them. The phase logic takes `now` explicitly so it runs without
//! a real clock; `spawn_scheduler` is the only part that reads time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rollcall_core::config::RollCallSettings;
use rollcall_core::error::{Result, RollCallError};
use rollcall_core::traits::{MessageTransport, RosterAccessor};
use rollcall_core::types::{InboundEvent, OutgoingMessage};

use crate::channel::{ResponseChannel, Signal};
use crate::cron::RollCallSchedule;
use crate::dispatch::PromptDispatcher;
use crate::report::format_report;
use crate::store::{Cycle, CycleStore};
use crate::tally::{TallyEngine, TallyResult, eligible_roster};

/// Per-group outcome of one phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    pub completed: Vec<String>,
    /// Nothing to do, or roster unavailable.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Owns cycle lifetime: starts cycles at prompt time, tallies them at result time.
pub struct CycleScheduler {
    settings: RollCallSettings,
    offset: FixedOffset,
    transport: Arc<dyn MessageTransport>,
    roster: Arc<dyn RosterAccessor>,
    store: Arc<CycleStore>,
    dispatcher: PromptDispatcher,
    tally: TallyEngine,
}

impl CycleScheduler {
    pub fn new(
        settings: RollCallSettings,
        schedule: &RollCallSchedule,
        transport: Arc<dyn MessageTransport>,
        roster: Arc<dyn RosterAccessor>,
        store: Arc<CycleStore>,
    ) -> Self {
        let dispatcher = PromptDispatcher::new(
            transport.clone(),
            Duration::from_millis(settings.poll_delay_ms),
            schedule.result_time_label(),
        );
        let tally = TallyEngine::new(transport.clone(), roster.clone(), store.clone(), settings.clone());
        Self {
            settings,
            offset: schedule.offset,
            transport,
            roster,
            store,
            dispatcher,
            tally,
        }
    }

    pub fn store(&self) -> &Arc<CycleStore> {
        &self.store
    }

    pub fn settings(&self) -> &RollCallSettings {
        &self.settings
    }

    /// Calendar date at `now` in the configured offset.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Prompt phase for every target group, one after the other.
    pub async fn on_prompt_trigger(&self, now: DateTime<Utc>) -> PhaseSummary {
        let groups = self.settings.target_groups();
        if groups.is_empty() {
            tracing::warn!("⚠️ Prompt time reached but no target group is configured");
        }

        let mut summary = PhaseSummary::default();
        for group in groups {
            match self.run_prompt(&group, now).await {
                Ok(_) => summary.completed.push(group),
                Err(e @ RollCallError::RosterUnavailable { .. }) => {
                    tracing::warn!("⏭️ Skipping prompt: {}", e);
                    summary.skipped.push(group);
                }
                Err(e) => {
                    tracing::error!("❌ Prompt failed for {}: {}", group, e);
                    summary.failed.push(group);
                }
            }
        }
        summary
    }

    /// Result phase for every group with a live cycle.
    pub async fn on_result_trigger(&self, now: DateTime<Utc>) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        for group in self.settings.target_groups() {
            if self.store.cycle(&group).is_none() {
                tracing::info!("⏭️ No live roll call in {}, nothing to tally", group);
                summary.skipped.push(group);
            }
        }

        for group in self.store.live_groups() {
            match self.run_result(&group, now).await {
                Ok(_) => summary.completed.push(group),
                Err(e @ (RollCallError::NoCycle(_) | RollCallError::RosterUnavailable { .. })) => {
                    tracing::warn!("⏭️ Skipping result: {}", e);
                    summary.skipped.push(group);
                }
                Err(e) => {
                    tracing::error!("❌ Result failed for {}: {}", group, e);
                    summary.failed.push(group);
                }
            }
        }
        summary
    }

    /// Start a new cycle in `group`. Any previous cycle is dropped first,
    /// so a failed dispatch leaves the group without a live cycle.
    pub async fn run_prompt(&self, group: &str, now: DateTime<Utc>) -> Result<Cycle> {
        if self.store.clear(group) {
            tracing::debug!("Previous cycle of {} discarded", group);
        }

        let roster = eligible_roster(self.roster.as_ref(), group).await?;
        let channel = ResponseChannel::from(self.settings.channel);
        let sent = self
            .dispatcher
            .dispatch(group, &roster, channel, self.local_date(now))
            .await?;

        let cycle = Cycle {
            group: group.to_string(),
            correlation_id: sent.correlation_id,
            channel: sent.channel,
            prompt_at: sent.sent_at,
            created_at: now,
        };
        self.store.start_cycle(cycle.clone());
        Ok(cycle)
    }

    /// Tally the live cycle of `group` and post the report.
    pub async fn run_result(&self, group: &str, now: DateTime<Utc>) -> Result<TallyResult> {
        let result = self.tally.compute_tally(group).await?;
        let day = self
            .store
            .cycle(group)
            .map(|c| self.local_date(c.created_at))
            .unwrap_or_else(|| self.local_date(now));

        let report = OutgoingMessage::text(group, format_report(&result, day));
        self.transport
            .send_message(&report)
            .await
            .map_err(|e| RollCallError::DispatchFailed {
                group: group.to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!("📨 Result posted to {}", group);
        Ok(result)
    }

    /// Feed a webhook event into the live cycle of its group.
    /// Returns whether the cycle's answers changed.
    pub fn record_event(&self, event: &InboundEvent) -> bool {
        let group = match event {
            InboundEvent::Message(msg) => &msg.thread_id,
            InboundEvent::PollVote { group, .. } | InboundEvent::Reaction { group, .. } => group,
        };
        let Some(cycle) = self.store.cycle(group) else {
            return false;
        };

        match ResponseChannel::from(cycle.channel).signal_from_event(event, &cycle) {
            Some(Signal::Answer { participant, classification, at }) => {
                tracing::debug!("🗳️ {} → {} in {}", participant, classification, group);
                self.store.record_response(group, &participant, classification, at)
            }
            Some(Signal::Retract { participant }) => {
                self.store.retract_response(group, &participant)
            }
            None => false,
        }
    }
}

/// Which phase a timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prompt,
    Result,
}

/// Next fire times of both phases.
#[derive(Debug, Clone)]
pub struct TriggerTimers {
    schedule: RollCallSchedule,
    pub next_prompt: Option<DateTime<Utc>>,
    pub next_result: Option<DateTime<Utc>>,
}

impl TriggerTimers {
    pub fn new(schedule: RollCallSchedule, now: DateTime<Utc>) -> Self {
        Self {
            next_prompt: schedule.next_prompt(now),
            next_result: schedule.next_result(now),
            schedule,
        }
    }

    /// Phases due at `now`, prompt first. Each fires once even if several
    /// of its slots were missed; the timer then moves past `now`.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Phase> {
        let mut due = Vec::new();
        if self.next_prompt.is_some_and(|t| t <= now) {
            due.push(Phase::Prompt);
            self.next_prompt = self.schedule.next_prompt(now);
        }
        if self.next_result.is_some_and(|t| t <= now) {
            due.push(Phase::Result);
            self.next_result = self.schedule.next_result(now);
        }
        due
    }
}

/// Spawn the scheduler loop as a background tokio task.
pub async fn spawn_scheduler(
    scheduler: Arc<CycleScheduler>,
    schedule: RollCallSchedule,
    check_interval_secs: u64,
) {
    tracing::info!(
        "⏰ Roll-call scheduler started (prompt '{}', result '{}', check every {}s)",
        schedule.prompt_expression,
        schedule.result_expression,
        check_interval_secs
    );

    let mut timers = TriggerTimers::new(schedule, Utc::now());
    let mut interval = tokio::time::interval(Duration::from_secs(check_interval_secs));

    loop {
        interval.tick().await;
        let now = Utc::now();

        for phase in timers.due(now) {
            let summary = match phase {
                Phase::Prompt => scheduler.on_prompt_trigger(now).await,
                Phase::Result => scheduler.on_result_trigger(now).await,
            };
            tracing::info!(
                "🔔 {:?} phase done: {} ok, {} skipped, {} failed",
                phase,
                summary.completed.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
        }
    }
}
