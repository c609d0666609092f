//! Execution history statuses, their state machine and stdout views.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::execution::ExecutionKind;

/// Stored in place of stdout after a history was cleared.
pub const TRUNCATED_NOTICE: &str = "Output truncated.\n";

/// Initiator types recorded on history entries.
pub const INITIATOR_PROJECT: &str = "project";
pub const INITIATOR_TEMPLATE: &str = "template";
pub const INITIATOR_SCHEDULER: &str = "scheduler";

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid regex"));

/// `host | STATUS => {` opening an ansible result block.
static FACTS_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>\S+) \| (?P<status>[A-Z]+!?)(?: \| rc=\d+)? => \{\s*$")
        .expect("valid regex")
});

// ---------------------------------------------------------------------------
// HistoryStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryStatus {
    Delay,
    Run,
    Ok,
    Error,
    Offline,
    Interrupted,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delay => "DELAY",
            Self::Run => "RUN",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Offline => "OFFLINE",
            Self::Interrupted => "INTERRUPTED",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "DELAY" => Ok(Self::Delay),
            "RUN" => Ok(Self::Run),
            "OK" => Ok(Self::Ok),
            "ERROR" => Ok(Self::Error),
            "OFFLINE" => Ok(Self::Offline),
            "INTERRUPTED" => Ok(Self::Interrupted),
            _ => Err(CoreError::Validation(format!(
                "Invalid history status: '{s}'. Must be one of: DELAY, RUN, OK, ERROR, OFFLINE, INTERRUPTED"
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        valid_transitions(*self).is_empty()
    }

    /// DELAY and RUN histories have no final output yet.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Delay | Self::Run)
    }
}

impl std::fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Statuses reachable from `from` in one step.
pub fn valid_transitions(from: HistoryStatus) -> &'static [HistoryStatus] {
    use HistoryStatus::*;
    match from {
        // Setup failures and stale queue entries skip RUN.
        Delay => &[Run, Error, Offline],
        Run => &[Ok, Error, Offline, Interrupted],
        Ok | Error | Offline | Interrupted => &[],
    }
}

pub fn can_transition(from: HistoryStatus, to: HistoryStatus) -> bool {
    valid_transitions(from).contains(&to)
}

pub fn validate_transition(from: HistoryStatus, to: HistoryStatus) -> Result<(), CoreError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Invalid history transition: {from} -> {to}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Output views
// ---------------------------------------------------------------------------

/// Remove ANSI escape sequences.
pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").into_owned()
}

/// Raw stdout view, colour codes stripped unless `color` is set.
pub fn raw_view(stdout: &str, color: bool) -> String {
    if color {
        stdout.to_string()
    } else {
        strip_ansi(stdout)
    }
}

/// Check that facts can be served for a history.
///
/// Playbook runs have no facts; active runs have no final output.
pub fn facts_gate(kind: ExecutionKind, status: HistoryStatus, id: i64) -> Result<(), CoreError> {
    if kind == ExecutionKind::Playbook {
        return Err(CoreError::NotFound {
            entity: "facts",
            id,
        });
    }
    if status.is_active() {
        return Err(CoreError::NotReady(format!(
            "History {id} is still {status}; facts are not available yet"
        )));
    }
    Ok(())
}

/// Parse `host | STATUS => { json }` blocks out of module stdout.
///
/// Each host maps to its result object with a `status` key added. Blocks
/// whose body is not valid JSON are kept as `{"status": ..., "stdout": ...}`.
pub fn parse_facts(stdout: &str) -> BTreeMap<String, serde_json::Value> {
    let clean = strip_ansi(stdout);
    let mut facts = BTreeMap::new();
    let mut lines = clean.lines();
    while let Some(line) = lines.next() {
        let Some(caps) = FACTS_HEADER_RE.captures(line) else {
            continue;
        };
        let host = caps["host"].to_string();
        let status = caps["status"].to_string();
        let mut body = String::from("{\n");
        for inner in lines.by_ref() {
            body.push_str(inner);
            body.push('\n');
            if inner == "}" {
                break;
            }
        }
        let mut value = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Object(map)) => serde_json::Value::Object(map),
            _ => serde_json::json!({ "stdout": body }),
        };
        if let Some(map) = value.as_object_mut() {
            map.insert("status".to_string(), serde_json::Value::String(status));
        }
        facts.insert(host, value);
    }
    facts
}
