//! RollCall configuration system.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, RollCallError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RollCallConfig {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub roll_call: RollCallSettings,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl RollCallConfig {
    /// Load config from the default path (~/.rollcall/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("📄 Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RollCallError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the RollCall home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rollcall")
    }

    /// Expand `~` in a user supplied path.
    pub fn expand_path(p: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(p).to_string())
    }

    /// Apply `ROLLCALL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the environment in production).
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(h) = lookup("ROLLCALL_PROMPT_HOUR").and_then(|v| v.trim().parse().ok()) {
            self.schedule.prompt_hour = h;
        }
        if let Some(m) = lookup("ROLLCALL_PROMPT_MINUTE").and_then(|v| v.trim().parse().ok()) {
            self.schedule.prompt_minute = m;
        }
        if let Some(group) = lookup("ROLLCALL_TARGET_GROUP") {
            let group = group.trim();
            if !group.is_empty() {
                self.roll_call.target_group = Some(group.to_string());
            }
        }
        if let Some(groups) = lookup("ROLLCALL_ALLOWED_GROUPS") {
            self.roll_call.allowed_groups = split_list(&groups);
        }
        if let Some(prefix) = lookup("ROLLCALL_PREFIX") {
            if !prefix.trim().is_empty() {
                self.commands.prefix = prefix.trim().to_string();
            }
        }
        if let Some(key) = lookup("ROLLCALL_BRIDGE_API_KEY") {
            self.whatsapp.api_key = key;
        }
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.schedule;
        if s.prompt_hour > 23 || s.prompt_minute > 59 {
            return Err(RollCallError::Config(format!(
                "Invalid prompt time {:02}:{:02}",
                s.prompt_hour, s.prompt_minute
            )));
        }
        if s.result_hour.is_some_and(|h| h > 23) || s.result_minute.is_some_and(|m| m > 59) {
            return Err(RollCallError::Config("Invalid result time".into()));
        }
        if s.result_hour.is_some() != s.result_minute.is_some() {
            return Err(RollCallError::Config(
                "result_hour and result_minute must be set together".into(),
            ));
        }
        s.offset()?;
        if self.roll_call.history_window == 0 {
            return Err(RollCallError::Config("history_window must be > 0".into()));
        }
        if self.commands.prefix.is_empty() {
            return Err(RollCallError::Config("Command prefix must not be empty".into()));
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect()
}

fn bool_true() -> bool { true }

/// When the daily roll call runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_prompt_hour")]
    pub prompt_hour: u32,
    #[serde(default)]
    pub prompt_minute: u32,
    /// Minutes between prompt and result when no explicit result time is set.
    #[serde(default = "default_result_offset")]
    pub result_offset_minutes: u32,
    #[serde(default)]
    pub result_hour: Option<u32>,
    #[serde(default)]
    pub result_minute: Option<u32>,
    /// Fixed local offset, e.g. "-03:00" for Brasília.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    /// Monday to Friday only.
    #[serde(default = "bool_true")]
    pub weekdays_only: bool,
}

fn default_prompt_hour() -> u32 { 7 }
fn default_result_offset() -> u32 { 15 }
fn default_utc_offset() -> String { "-03:00".into() }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            prompt_hour: default_prompt_hour(),
            prompt_minute: 0,
            result_offset_minutes: default_result_offset(),
            result_hour: None,
            result_minute: None,
            utc_offset: default_utc_offset(),
            weekdays_only: true,
        }
    }
}

impl ScheduleConfig {
    /// Parse `utc_offset` ("-03:00", "+05:30", "Z").
    pub fn offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }

    /// Explicit result time, if configured.
    pub fn explicit_result_time(&self) -> Option<(u32, u32)> {
        Some((self.result_hour?, self.result_minute?))
    }
}

/// Parse a `±HH:MM` offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0)
            .ok_or_else(|| RollCallError::Config("Invalid UTC offset".into()));
    }
    let invalid = || RollCallError::Config(format!("Invalid utc_offset '{raw}' (expected ±HH:MM)"));
    let (sign, rest) = match raw.as_bytes().first() {
        Some(b'+') => (1, &raw[1..]),
        Some(b'-') => (-1, &raw[1..]),
        _ => return Err(invalid()),
    };
    let (h, m) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = h.parse().map_err(|_| invalid())?;
    let minutes: i32 = m.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// How participants answer the roll call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseChannelKind {
    /// Single-choice poll attached to the prompt.
    Poll,
    /// Emoji reactions on the prompt message.
    Reaction,
    /// Free-text replies ("1", "presente") after the prompt.
    Text,
}

impl std::fmt::Display for ResponseChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseChannelKind::Poll => write!(f, "poll"),
            ResponseChannelKind::Reaction => write!(f, "reaction"),
            ResponseChannelKind::Text => write!(f, "text"),
        }
    }
}

/// What happens to participants that sent no signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnansweredPolicy {
    /// Counted as absent.
    Absent,
    /// Left in their own "no response" bucket.
    NoResponse,
}

/// Unanswered policy, one per response channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnansweredConfig {
    #[serde(default = "default_poll_policy")]
    pub poll: UnansweredPolicy,
    #[serde(default = "default_absent_policy")]
    pub reaction: UnansweredPolicy,
    #[serde(default = "default_absent_policy")]
    pub text: UnansweredPolicy,
}

fn default_poll_policy() -> UnansweredPolicy { UnansweredPolicy::NoResponse }
fn default_absent_policy() -> UnansweredPolicy { UnansweredPolicy::Absent }

impl Default for UnansweredConfig {
    fn default() -> Self {
        Self {
            poll: default_poll_policy(),
            reaction: default_absent_policy(),
            text: default_absent_policy(),
        }
    }
}

/// Roll-call behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollCallSettings {
    #[serde(default = "default_channel")]
    pub channel: ResponseChannelKind,
    /// Single group the roll call runs in when `allowed_groups` is empty.
    #[serde(default)]
    pub target_group: Option<String>,
    /// Groups the bot serves. Takes precedence over `target_group`.
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    /// How many recent messages the tally scans.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub unanswered: UnansweredConfig,
    /// Pause between the announcement and the poll.
    #[serde(default = "default_poll_delay")]
    pub poll_delay_ms: u64,
}

fn default_channel() -> ResponseChannelKind { ResponseChannelKind::Poll }
fn default_history_window() -> usize { 50 }
fn default_poll_delay() -> u64 { 1500 }

impl Default for RollCallSettings {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            target_group: None,
            allowed_groups: vec![],
            history_window: default_history_window(),
            unanswered: UnansweredConfig::default(),
            poll_delay_ms: default_poll_delay(),
        }
    }
}

impl RollCallSettings {
    /// Groups the scheduled roll call runs in.
    pub fn target_groups(&self) -> Vec<String> {
        if !self.allowed_groups.is_empty() {
            return self.allowed_groups.clone();
        }
        self.target_group.iter().cloned().collect()
    }

    pub fn is_target(&self, group: &str) -> bool {
        self.target_groups().iter().any(|g| g == group)
    }

    pub fn unanswered_for(&self, kind: ResponseChannelKind) -> UnansweredPolicy {
        match kind {
            ResponseChannelKind::Poll => self.unanswered.poll,
            ResponseChannelKind::Reaction => self.unanswered.reaction,
            ResponseChannelKind::Text => self.unanswered.text,
        }
    }
}

/// Chat command layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Identities (or bare phone numbers) allowed to run commands anywhere.
    #[serde(default)]
    pub owners: Vec<String>,
}

fn default_prefix() -> String { "!".into() }

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_prefix(),
            owners: vec![],
        }
    }
}

/// WhatsApp HTTP bridge connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,
    #[serde(default = "default_session")]
    pub session: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bridge_url() -> String { "http://127.0.0.1:3001".into() }
fn default_session() -> String { "default".into() }
fn default_request_timeout() -> u64 { 30 }

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            session: default_session(),
            api_key: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_config_file() {
        let path = std::env::temp_dir().join("rollcall-no-such-dir").join("config.toml");
        let err = RollCallConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, RollCallError::Io(_)));
    }

    #[test]
    fn test_default_config() {
        let config = RollCallConfig::default();
        assert_eq!(config.schedule.prompt_hour, 7);
        assert_eq!(config.schedule.prompt_minute, 0);
        assert_eq!(config.schedule.result_offset_minutes, 15);
        assert_eq!(config.roll_call.channel, ResponseChannelKind::Poll);
        assert_eq!(config.commands.prefix, "!");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [schedule]
            prompt_hour = 8
            prompt_minute = 30
            utc_offset = "+01:00"

            [roll_call]
            channel = "reaction"
            target_group = "120363000000000000@g.us"

            [roll_call.unanswered]
            reaction = "no_response"
        "#;

        let config = RollCallConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.schedule.prompt_hour, 8);
        assert_eq!(config.roll_call.channel, ResponseChannelKind::Reaction);
        assert_eq!(
            config.roll_call.unanswered_for(ResponseChannelKind::Reaction),
            UnansweredPolicy::NoResponse
        );
        assert_eq!(config.schedule.offset().unwrap().local_minus_utc(), 3600);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config = RollCallConfig::from_toml("").unwrap();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.roll_call.history_window, 50);
        assert_eq!(config.schedule.offset().unwrap().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn test_target_groups_prefer_allow_list() {
        let mut settings = RollCallSettings {
            target_group: Some("solo@g.us".into()),
            ..Default::default()
        };
        assert_eq!(settings.target_groups(), vec!["solo@g.us".to_string()]);

        settings.allowed_groups = vec!["a@g.us".into(), "b@g.us".into()];
        assert_eq!(settings.target_groups().len(), 2);
        assert!(!settings.is_target("solo@g.us"));
    }

    #[test]
    fn test_no_targets_when_unconfigured() {
        assert!(RollCallSettings::default().target_groups().is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ROLLCALL_PROMPT_HOUR", "06"),
            ("ROLLCALL_PROMPT_MINUTE", "45"),
            ("ROLLCALL_ALLOWED_GROUPS", " a@g.us, ,b@g.us "),
            ("ROLLCALL_PREFIX", "/"),
        ]);
        let mut config = RollCallConfig::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.schedule.prompt_hour, 6);
        assert_eq!(config.schedule.prompt_minute, 45);
        assert_eq!(config.roll_call.allowed_groups, vec!["a@g.us", "b@g.us"]);
        assert_eq!(config.commands.prefix, "/");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RollCallConfig::default();
        config.schedule.prompt_hour = 24;
        assert!(config.validate().is_err());

        let mut config = RollCallConfig::default();
        config.schedule.utc_offset = "03:00".into();
        assert!(config.validate().is_err());

        let mut config = RollCallConfig::default();
        config.schedule.result_hour = Some(7);
        assert!(config.validate().is_err());

        let mut config = RollCallConfig::default();
        config.roll_call.history_window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 19800);
        assert!(parse_utc_offset("-3").is_err());
    }

    #[test]
    fn test_home_dir() {
        let home = RollCallConfig::home_dir();
        assert!(home.to_string_lossy().contains("rollcall"));
    }
}
