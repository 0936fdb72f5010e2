//! # RollCall Scheduler
//!
//! Daily roll call ("tiragem de falta") for group chats: a prompt goes out
//! at a fixed time on weekdays, members answer by poll vote, emoji reaction
//! or text reply, and a tally report follows a few minutes later.
//!
//! ## Architecture
//! ```text
//! spawn_scheduler (tokio interval)
//!   ├── TriggerTimers: "0 7 * * 1-5" / "15 7 * * 1-5"
//!   └── CycleScheduler
//!         ├── on_prompt_trigger → PromptDispatcher → CycleStore::start_cycle
//!         └── on_result_trigger → TallyEngine → report → group
//!
//! Webhook events → CycleScheduler::record_event → CycleStore (live answers)
//! TallyEngine = history scan (ResponseChannel) + live answers for gaps
//! ```

pub mod channel;
pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod report;
pub mod store;
pub mod tally;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use channel::{HISTORY_WINDOW, ResponseChannel};
pub use cron::RollCallSchedule;
pub use dispatch::{Dispatched, PromptDispatcher};
pub use engine::{CycleScheduler, Phase, PhaseSummary, TriggerTimers, spawn_scheduler};
pub use store::{Cycle, CycleStore};
pub use tally::{Bucket, TallyEngine, TallyResult};
