//! Host entries and bracket range expansion.
//!
//! A RANGE host names many addresses with one pattern:
//! `10.0.0.[1:3]` stands for `10.0.0.1`, `10.0.0.2` and `10.0.0.3`.
//! Expansion is lazy; [`HostRange::iter`] yields names on demand.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// `prefix[start:stop]suffix` with exactly one bracket pair.
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>[^\[\]]*)\[(?P<start>[^:\[\]]*):(?P<stop>[^\[\]]*)\](?P<suffix>[^\[\]]*)$")
        .expect("valid range regex")
});

/// Most addresses one RANGE host may name.
pub const MAX_RANGE_HOSTS: u64 = 65_536;

// ---------------------------------------------------------------------------
// HostKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostKind {
    Host,
    Range,
}

impl HostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "HOST",
            Self::Range => "RANGE",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "HOST" => Ok(Self::Host),
            "RANGE" => Ok(Self::Range),
            _ => Err(CoreError::Validation(format!(
                "Invalid host type: '{s}'. Must be one of: HOST, RANGE"
            ))),
        }
    }
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HostRange
// ---------------------------------------------------------------------------

/// A parsed `prefix[start:stop]suffix` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    prefix: String,
    suffix: String,
    start: u64,
    stop: u64,
    /// Zero padding width when `start` was written with leading zeros.
    width: usize,
}

impl HostRange {
    pub fn parse(pattern: &str) -> Result<Self, CoreError> {
        let caps = RANGE_RE.captures(pattern).ok_or_else(|| {
            CoreError::Validation(format!(
                "Invalid host range '{pattern}': expected 'prefix[start:stop]suffix'"
            ))
        })?;
        let start_text = &caps["start"];
        let stop_text = &caps["stop"];
        let start = parse_bound(pattern, start_text)?;
        let stop = parse_bound(pattern, stop_text)?;
        if start > stop {
            return Err(CoreError::Validation(format!(
                "Invalid host range '{pattern}': start {start} is greater than stop {stop}"
            )));
        }
        if stop - start >= MAX_RANGE_HOSTS {
            return Err(CoreError::Validation(format!(
                "Invalid host range '{pattern}': more than {MAX_RANGE_HOSTS} hosts"
            )));
        }
        let width = if start_text.len() > 1 && start_text.starts_with('0') {
            start_text.len()
        } else {
            0
        };
        Ok(Self {
            prefix: caps["prefix"].to_string(),
            suffix: caps["suffix"].to_string(),
            start,
            stop,
            width,
        })
    }

    /// Number of addresses the range names.
    pub fn len(&self) -> u64 {
        (self.stop - self.start).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Lazily yield every host name in the range.
    pub fn iter(&self) -> impl Iterator<Item = String> + '_ {
        (self.start..=self.stop).map(move |n| {
            format!("{}{:0width$}{}", self.prefix, n, self.suffix, width = self.width)
        })
    }
}

fn parse_bound(pattern: &str, text: &str) -> Result<u64, CoreError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::Validation(format!(
            "Invalid host range '{pattern}': '{text}' is not a number"
        )));
    }
    text.parse::<u64>().map_err(|_| {
        CoreError::Validation(format!(
            "Invalid host range '{pattern}': '{text}' is out of range"
        ))
    })
}

/// Validate a host name for its kind.
pub fn validate_host_name(kind: HostKind, name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("Host name must not be empty".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(format!(
            "Host name '{name}' must not contain whitespace"
        )));
    }
    match kind {
        HostKind::Host => Ok(()),
        HostKind::Range => HostRange::parse(name).map(|_| ()),
    }
}

/// Expand a host entry into concrete names.
pub fn expand_host(kind: HostKind, name: &str) -> Result<Vec<String>, CoreError> {
    match kind {
        HostKind::Host => Ok(vec![name.to_string()]),
        HostKind::Range => Ok(HostRange::parse(name)?.iter().collect()),
    }
}
