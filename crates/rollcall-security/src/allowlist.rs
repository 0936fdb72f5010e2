//! Owner and group allowlist management.
//!
//! Controls which senders can run chat commands and in which groups the
//! roll call is allowed to run.

use rollcall_core::config::{CommandsConfig, RollCallSettings};
use rollcall_core::types::{IncomingMessage, ThreadType, phone_of};
use std::collections::HashSet;

/// What a command needs to be allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Runs anywhere, for anyone (e.g. showing the group id).
    Open,
    /// Group commands, subject to the allow-list.
    Group,
    /// Starts or tallies a roll call: only inside a roll-call target group.
    RollCall,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Tell the sender the command only works in groups.
    RejectNotGroup,
    /// Drop silently so unconfigured groups are not flooded.
    Ignore,
}

/// Manages owners and group allow-lists for command enforcement.
pub struct Allowlist {
    owners: HashSet<String>,
    allowed_groups: HashSet<String>,
    target_groups: HashSet<String>,
}

impl Allowlist {
    /// Create a new allowlist from command and roll-call configuration.
    pub fn new(commands: &CommandsConfig, roll_call: &RollCallSettings) -> Self {
        Self {
            owners: commands.owners.iter().map(|o| phone_of(o).to_string()).collect(),
            allowed_groups: roll_call.allowed_groups.iter().cloned().collect(),
            target_groups: roll_call.target_groups().into_iter().collect(),
        }
    }

    /// Owners match on the bare phone number so either `5511..` or
    /// `5511..@c.us` can be configured.
    pub fn is_owner(&self, sender_id: &str) -> bool {
        self.owners.contains(phone_of(sender_id))
    }

    /// With an empty allow-list every group may use manual commands.
    pub fn is_group_allowed(&self, group: &str) -> bool {
        self.allowed_groups.is_empty() || self.allowed_groups.contains(group)
    }

    /// Whether the scheduled roll call runs in this group.
    pub fn is_roll_call_group(&self, group: &str) -> bool {
        self.target_groups.contains(group)
    }

    /// Decide whether `msg` may run a command of the given scope.
    pub fn check(&self, msg: &IncomingMessage, scope: CommandScope) -> Decision {
        if scope == CommandScope::Open {
            return Decision::Allow;
        }

        let is_group = msg.thread_type == ThreadType::Group;

        if scope == CommandScope::RollCall {
            if !is_group {
                return Decision::RejectNotGroup;
            }
            if !self.is_roll_call_group(&msg.thread_id) {
                tracing::info!(
                    "🚫 Roll-call command blocked in non-target group {}",
                    msg.thread_id
                );
                return Decision::Ignore;
            }
            // Target groups are always inside the allow-list.
            return Decision::Allow;
        }

        if msg.from_self || self.is_owner(&msg.sender_id) {
            return Decision::Allow;
        }
        if !is_group {
            return Decision::RejectNotGroup;
        }
        if !self.is_group_allowed(&msg.thread_id) {
            tracing::info!("🚫 Command blocked in unauthorized group {}", msg.thread_id);
            return Decision::Ignore;
        }
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(thread: &str, sender: &str, kind: ThreadType) -> IncomingMessage {
        IncomingMessage {
            id: "m".into(),
            thread_id: thread.into(),
            thread_name: None,
            sender_id: sender.into(),
            sender_name: None,
            content: "!x".into(),
            thread_type: kind,
            from_self: false,
            timestamp: chrono::Utc::now(),
            reply_to: None,
        }
    }

    fn allowlist(allowed: &[&str], target: Option<&str>, owners: &[&str]) -> Allowlist {
        let commands = CommandsConfig {
            owners: owners.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let roll_call = RollCallSettings {
            allowed_groups: allowed.iter().map(|s| s.to_string()).collect(),
            target_group: target.map(String::from),
            ..Default::default()
        };
        Allowlist::new(&commands, &roll_call)
    }

    #[test]
    fn test_owner_matches_bare_number() {
        let list = allowlist(&[], None, &["5571900000000"]);
        assert!(list.is_owner("5571900000000@c.us"));
        assert!(!list.is_owner("5571900000001@c.us"));
    }

    #[test]
    fn test_group_command_rules() {
        let list = allowlist(&["a@g.us"], None, &["owner"]);
        assert_eq!(list.check(&msg("a@g.us", "x@c.us", ThreadType::Group), CommandScope::Group), Decision::Allow);
        assert_eq!(list.check(&msg("b@g.us", "x@c.us", ThreadType::Group), CommandScope::Group), Decision::Ignore);
        assert_eq!(list.check(&msg("x@c.us", "x@c.us", ThreadType::Direct), CommandScope::Group), Decision::RejectNotGroup);
        // Owners bypass the group restriction.
        assert_eq!(list.check(&msg("b@g.us", "owner@c.us", ThreadType::Group), CommandScope::Group), Decision::Allow);
    }

    #[test]
    fn test_open_commands_always_allowed() {
        let list = allowlist(&["a@g.us"], None, &[]);
        let direct = msg("x@c.us", "x@c.us", ThreadType::Direct);
        assert_eq!(list.check(&direct, CommandScope::Open), Decision::Allow);
    }

    #[test]
    fn test_roll_call_only_in_target_group() {
        // Empty allow-list: only the explicit target group runs roll calls.
        let list = allowlist(&[], Some("t@g.us"), &["owner"]);
        assert_eq!(list.check(&msg("t@g.us", "x@c.us", ThreadType::Group), CommandScope::RollCall), Decision::Allow);
        assert_eq!(list.check(&msg("other@g.us", "x@c.us", ThreadType::Group), CommandScope::RollCall), Decision::Ignore);
        assert_eq!(list.check(&msg("other@g.us", "owner@c.us", ThreadType::Group), CommandScope::RollCall), Decision::Ignore);
        // Other group commands still work anywhere with an empty allow-list.
        assert_eq!(list.check(&msg("other@g.us", "x@c.us", ThreadType::Group), CommandScope::Group), Decision::Allow);
    }
}
