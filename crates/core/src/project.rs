//! Project repository status and reserved project variables.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::variables::{parse_bool, Variables};

/// Repository backend tag. Defaults to [`DEFAULT_REPO_TYPE`].
pub const VAR_REPO_TYPE: &str = "repo_type";
pub const VAR_REPO_BRANCH: &str = "repo_branch";
pub const VAR_REPO_PASSWORD: &str = "repo_password";
pub const VAR_REPO_KEY: &str = "repo_key";
pub const VAR_REPO_SYNC_ON_RUN: &str = "repo_sync_on_run";

pub const RESERVED_VARS: &[&str] = &[
    VAR_REPO_TYPE,
    VAR_REPO_BRANCH,
    VAR_REPO_PASSWORD,
    VAR_REPO_KEY,
    VAR_REPO_SYNC_ON_RUN,
];

pub const DEFAULT_REPO_TYPE: &str = "MANUAL";

/// Revision reported by backends without version control.
pub const NO_VCS: &str = "NO VCS";

// ---------------------------------------------------------------------------
// ProjectStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    New,
    WaitSync,
    Ok,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::WaitSync => "WAIT_SYNC",
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "NEW" => Ok(Self::New),
            "WAIT_SYNC" => Ok(Self::WaitSync),
            "OK" => Ok(Self::Ok),
            "ERROR" => Ok(Self::Error),
            _ => Err(CoreError::Validation(format!(
                "Invalid project status: '{s}'. Must be one of: NEW, WAIT_SYNC, OK, ERROR"
            ))),
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statuses reachable from `from`. Only sync operations move a project.
pub fn valid_transitions(from: ProjectStatus) -> &'static [ProjectStatus] {
    use ProjectStatus::*;
    match from {
        New | Ok | Error => &[WaitSync],
        WaitSync => &[Ok, Error],
    }
}

pub fn validate_transition(from: ProjectStatus, to: ProjectStatus) -> Result<(), CoreError> {
    if valid_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Invalid project transition: {from} -> {to}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Reserved variables
// ---------------------------------------------------------------------------

/// Repository backend tag of a project.
pub fn repo_type(vars: &Variables) -> &str {
    vars.get(VAR_REPO_TYPE)
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_REPO_TYPE)
}

pub fn sync_on_run(vars: &Variables) -> bool {
    vars.get(VAR_REPO_SYNC_ON_RUN)
        .map(|v| parse_bool(v))
        .unwrap_or(false)
}

/// Project variables that act as execution defaults.
pub fn execution_defaults(vars: &Variables) -> Variables {
    vars.iter()
        .filter(|(k, _)| !RESERVED_VARS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Validate a project name.
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation(
            "Project name must not be empty".to_string(),
        ));
    }
    Ok(())
}
