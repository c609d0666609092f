//! Hook types and the lifecycle events they subscribe to.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookType {
    /// POST JSON to each recipient URL.
    Http,
    /// Run each recipient script from the hooks directory with JSON on stdin.
    Script,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Script => "SCRIPT",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "HTTP" => Ok(Self::Http),
            "SCRIPT" => Ok(Self::Script),
            _ => Err(CoreError::Validation(format!(
                "Invalid hook type: '{s}'. Must be one of: HTTP, SCRIPT"
            ))),
        }
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event a hook fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookWhen {
    OnExecution,
    AfterExecution,
    OnObjectAdd,
    OnObjectUpd,
    OnObjectDel,
}

impl HookWhen {
    pub const ALL: [HookWhen; 5] = [
        Self::OnExecution,
        Self::AfterExecution,
        Self::OnObjectAdd,
        Self::OnObjectUpd,
        Self::OnObjectDel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnExecution => "on_execution",
            Self::AfterExecution => "after_execution",
            Self::OnObjectAdd => "on_object_add",
            Self::OnObjectUpd => "on_object_upd",
            Self::OnObjectDel => "on_object_del",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid hook event: '{s}'. Must be one of: on_execution, after_execution, \
                     on_object_add, on_object_upd, on_object_del"
                ))
            })
    }
}

impl std::fmt::Display for HookWhen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate hook recipients for a hook type.
///
/// HTTP recipients must be http(s) URLs. SCRIPT recipients must be plain
/// file names inside the hooks directory.
pub fn validate_recipients(hook_type: HookType, recipients: &[String]) -> Result<(), CoreError> {
    if recipients.is_empty() {
        return Err(CoreError::Validation(
            "Hook must have at least one recipient".to_string(),
        ));
    }
    for recipient in recipients {
        let ok = match hook_type {
            HookType::Http => {
                recipient.starts_with("http://") || recipient.starts_with("https://")
            }
            HookType::Script => {
                !recipient.is_empty()
                    && !recipient.contains('/')
                    && recipient != "."
                    && recipient != ".."
            }
        };
        if !ok {
            return Err(CoreError::Validation(format!(
                "Invalid {hook_type} hook recipient: '{recipient}'"
            )));
        }
    }
    Ok(())
}
