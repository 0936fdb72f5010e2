//! # RollCall Security
//! Who may run which chat command, and where.

pub mod allowlist;

pub use allowlist::{Allowlist, CommandScope, Decision};
