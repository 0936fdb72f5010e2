//! # RollCall Core
//!
//! Shared building blocks for the roll-call bot: configuration, the error
//! type, domain types (participants, responses, history messages) and the
//! transport traits the scheduler and gateway call into.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::RollCallConfig;
pub use error::{Result, RollCallError};
pub use traits::{MessageTransport, RosterAccessor};
pub use types::{Classification, Participant};
