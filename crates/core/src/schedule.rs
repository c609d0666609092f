//! Periodic task kinds, schedule parsing and due-time evaluation.
//!
//! Two schedule types exist:
//! - `INTERVAL`: a positive number of seconds between runs.
//! - `CRONTAB`: five cron fields (minute, hour, day of month, month, day of
//!   week). Missing trailing fields default to `*`; an empty expression
//!   fires every minute. All five fields must match (no Vixie-style OR of
//!   the two day fields).

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::execution::ExecutionKind;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// PeriodicKind
// ---------------------------------------------------------------------------

/// What a periodic task launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodicKind {
    Playbook,
    Module,
    Template,
}

impl PeriodicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playbook => "PLAYBOOK",
            Self::Module => "MODULE",
            Self::Template => "TEMPLATE",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "PLAYBOOK" => Ok(Self::Playbook),
            "MODULE" => Ok(Self::Module),
            "TEMPLATE" => Ok(Self::Template),
            _ => Err(CoreError::Validation(format!(
                "Invalid periodic task kind: '{s}'. Must be one of: PLAYBOOK, MODULE, TEMPLATE"
            ))),
        }
    }

    /// Execution kind for direct kinds. `None` for templates.
    pub fn execution_kind(&self) -> Option<ExecutionKind> {
        match self {
            Self::Playbook => Some(ExecutionKind::Playbook),
            Self::Module => Some(ExecutionKind::Module),
            Self::Template => None,
        }
    }
}

impl std::fmt::Display for PeriodicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ScheduleType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Interval,
    Crontab,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interval => "INTERVAL",
            Self::Crontab => "CRONTAB",
        }
    }

    /// Parse a schedule type. Matching is case-sensitive.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "INTERVAL" => Ok(Self::Interval),
            "CRONTAB" => Ok(Self::Crontab),
            _ => Err(CoreError::Validation(format!(
                "Invalid schedule type: '{s}'. Must be one of: INTERVAL, CRONTAB"
            ))),
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Cron expression
// ---------------------------------------------------------------------------

const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// (name, min, max) per field, in expression order.
const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day of month", 1, 31),
    ("month", 1, 12),
    ("day of week", 0, 6),
];

/// Bit set of allowed values for one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CronField(u64);

impl CronField {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    fields: [CronField; 5],
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let mut tokens: Vec<&str> = expr.split_whitespace().collect();
        if tokens.len() > FIELDS.len() {
            return Err(CoreError::Validation(format!(
                "Invalid crontab expression '{expr}': expected at most 5 fields"
            )));
        }
        tokens.resize(FIELDS.len(), "*");

        let mut fields = [CronField(0); 5];
        for (i, token) in tokens.iter().enumerate() {
            let (_, min, max) = FIELDS[i];
            fields[i] = parse_field(token, min, max)?;
        }
        Ok(Self { fields })
    }

    /// Whether `at` falls on a scheduled minute.
    pub fn matches(&self, at: Timestamp) -> bool {
        let values = [
            at.minute(),
            at.hour(),
            at.day(),
            at.month(),
            at.weekday().num_days_from_sunday(),
        ];
        self.fields
            .iter()
            .zip(values)
            .all(|(field, value)| field.contains(value))
    }
}

fn parse_field(token: &str, min: u32, max: u32) -> Result<CronField, CoreError> {
    let mut bits = 0u64;
    for item in token.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().map_err(|_| {
                    CoreError::Validation(format!("Invalid step '{step}'."))
                })?;
                if step == 0 {
                    return Err(CoreError::Validation("Invalid step '0'.".to_string()));
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, stop) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_value(a, min, max)?, parse_value(b, min, max)?)
        } else {
            let value = parse_value(range, min, max)?;
            // `a/n` runs from `a` to the field maximum.
            if item.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };
        if start > stop {
            return Err(CoreError::Validation(format!(
                "Invalid range: {start} > {stop}."
            )));
        }
        let mut v = start;
        while v <= stop {
            bits |= 1 << v;
            v += step;
        }
    }
    Ok(CronField(bits))
}

fn parse_value(token: &str, min: u32, max: u32) -> Result<u32, CoreError> {
    let value = match token.parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            let lower = token.to_ascii_lowercase();
            WEEKDAYS
                .iter()
                .position(|d| *d == lower)
                .map(|p| p as u32)
                .ok_or_else(|| {
                    CoreError::Validation(format!("Invalid weekday literal '{token}'."))
                })?
        }
    };
    if value < min {
        return Err(CoreError::Validation(format!(
            "Invalid beginning range: {value} < {min}."
        )));
    }
    if value > max {
        return Err(CoreError::Validation(format!(
            "Invalid end range: {value} > {max}."
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A parsed periodic schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Interval { seconds: i64 },
    Cron(CronSchedule),
}

impl Schedule {
    pub fn parse(kind: ScheduleType, text: &str) -> Result<Self, CoreError> {
        match kind {
            ScheduleType::Interval => {
                let seconds = text.trim().parse::<i64>().map_err(|_| {
                    CoreError::Validation(format!(
                        "Invalid interval '{text}': expected a whole number of seconds"
                    ))
                })?;
                if seconds <= 0 {
                    return Err(CoreError::Validation(format!(
                        "Invalid interval '{text}': must be positive"
                    )));
                }
                Ok(Self::Interval { seconds })
            }
            ScheduleType::Crontab => Ok(Self::Cron(CronSchedule::parse(text)?)),
        }
    }

    /// Whether a task last run at `last_run` is due at `now`.
    pub fn is_due(&self, now: Timestamp, last_run: Option<Timestamp>) -> bool {
        match self {
            Self::Interval { seconds } => match last_run {
                None => true,
                Some(last) => (now - last).num_seconds() >= *seconds,
            },
            Self::Cron(cron) => {
                if !cron.matches(now) {
                    return false;
                }
                // At most once per calendar minute.
                match last_run {
                    None => true,
                    Some(last) => minute_floor(last) != minute_floor(now),
                }
            }
        }
    }
}

fn minute_floor(at: Timestamp) -> i64 {
    at.timestamp().div_euclid(60)
}
