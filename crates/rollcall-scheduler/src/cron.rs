//! Lightweight cron expression parser, evaluated in a fixed local offset.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Fields: *, */N, N, A-B, comma lists. DOM and MON must be `*`.
//! Example: "0 7 * * 1-5" = weekdays at 07:00.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use rollcall_core::config::ScheduleConfig;
use rollcall_core::error::{Result, RollCallError};

/// Minutes scanned ahead before giving up (8 days covers any weekly pattern).
const SEARCH_MINUTES: i64 = 8 * 24 * 60;

/// Parse a cron expression and compute the next run strictly after `after`.
pub fn next_run_from_cron(
    expression: &str,
    after: DateTime<Utc>,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let fields = CronSpec::parse(expression)?;

    let mut candidate = after.with_timezone(&offset) + Duration::minutes(1);
    // Zero out seconds
    candidate = candidate
        .with_second(0)
        .and_then(|c| c.with_nanosecond(0))
        .unwrap_or(candidate);

    for _ in 0..SEARCH_MINUTES {
        if fields.matches(candidate.minute(), candidate.hour(), candidate.weekday().num_days_from_sunday()) {
            return Some(candidate.with_timezone(&Utc));
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// A parsed cron expression.
#[derive(Debug, Clone)]
struct CronSpec {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    weekdays: Vec<u32>,
}

impl CronSpec {
    fn parse(expression: &str) -> Option<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            tracing::warn!(
                "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
                expression
            );
            return None;
        }
        if parts[2] != "*" || parts[3] != "*" {
            tracing::warn!("Cron expression '{}': only '*' is supported for DOM and MON", expression);
            return None;
        }

        // Sunday may be written as 0 or 7.
        let weekdays = parse_field(parts[4], 0, 7)?
            .into_iter()
            .map(|d| d % 7)
            .collect();

        Some(Self {
            minutes: parse_field(parts[0], 0, 59)?,
            hours: parse_field(parts[1], 0, 23)?,
            weekdays,
        })
    }

    fn matches(&self, minute: u32, hour: u32, weekday: u32) -> bool {
        self.minutes.contains(&minute) && self.hours.contains(&hour) && self.weekdays.contains(&weekday)
    }
}

/// Parse a cron field into a list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N: every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "0,15,30,45" or "1-3,5"
    if field.contains(',') {
        let mut values = Vec::new();
        for part in field.split(',') {
            values.extend(parse_field(part.trim(), min, max)?);
        }
        return Some(values);
    }

    // Range: "1-5"
    if let Some((start, end)) = field.split_once('-') {
        let start: u32 = start.parse().ok()?;
        let end: u32 = end.parse().ok()?;
        if start > end || start < min || end > max {
            return None;
        }
        return Some((start..=end).collect());
    }

    // Single number
    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max {
        Some(vec![n])
    } else {
        None
    }
}

/// The two daily trigger times of the roll call.
#[derive(Debug, Clone)]
pub struct RollCallSchedule {
    pub prompt_expression: String,
    pub result_expression: String,
    pub offset: FixedOffset,
    result_hour: u32,
    result_minute: u32,
}

impl RollCallSchedule {
    /// Build the prompt and result expressions from configuration.
    ///
    /// The result time is the prompt time plus `result_offset_minutes`
    /// unless set explicitly; when that crosses midnight the result's
    /// weekday set moves one day forward with it.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        let offset = config.offset()?;
        let weekdays: Vec<u32> = if config.weekdays_only {
            (1..=5).collect()
        } else {
            (0..=6).collect()
        };

        let (result_hour, result_minute, day_shift) = match config.explicit_result_time() {
            Some((h, m)) => (h, m, 0),
            None => {
                let total = config.prompt_hour * 60 + config.prompt_minute + config.result_offset_minutes;
                ((total / 60) % 24, total % 60, total / (24 * 60))
            }
        };

        let prompt_expression = format!(
            "{} {} * * {}",
            config.prompt_minute,
            config.prompt_hour,
            weekday_field(&weekdays, 0)
        );
        let result_expression = format!(
            "{} {} * * {}",
            result_minute,
            result_hour,
            weekday_field(&weekdays, day_shift)
        );

        for expr in [&prompt_expression, &result_expression] {
            if CronSpec::parse(expr).is_none() {
                return Err(RollCallError::Config(format!("Invalid schedule expression '{expr}'")));
            }
        }

        Ok(Self {
            prompt_expression,
            result_expression,
            offset,
            result_hour,
            result_minute,
        })
    }

    pub fn next_prompt(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_run_from_cron(&self.prompt_expression, after, self.offset)
    }

    pub fn next_result(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        next_run_from_cron(&self.result_expression, after, self.offset)
    }

    /// "HH:MM" of the result phase, shown in the prompt as the deadline.
    pub fn result_time_label(&self) -> String {
        format!("{:02}:{:02}", self.result_hour, self.result_minute)
    }
}

fn weekday_field(days: &[u32], shift: u32) -> String {
    let mut shifted: Vec<u32> = days.iter().map(|d| (d + shift) % 7).collect();
    shifted.sort_unstable();
    shifted
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
