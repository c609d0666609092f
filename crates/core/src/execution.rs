//! Execution kinds, inventory references and the concrete run request.
//!
//! An [`ExecutionRequest`] is what every trigger (direct call, template,
//! periodic task) is reduced to before it enters the execution pipeline.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;
use crate::variables::Variables;

/// Default host pattern for module runs.
pub const DEFAULT_MODULE_GROUP: &str = "all";

/// Stored module variable holding the host pattern.
pub const VAR_MODULE_GROUP: &str = "group";
/// Stored module variable holding the `-a` arguments.
pub const VAR_MODULE_ARGS: &str = "args";

// ---------------------------------------------------------------------------
// ExecutionKind
// ---------------------------------------------------------------------------

/// What kind of ansible run a history record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionKind {
    Playbook,
    Module,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playbook => "PLAYBOOK",
            Self::Module => "MODULE",
        }
    }

    /// Parse a kind name. Matching is case-insensitive.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s.to_ascii_uppercase().as_str() {
            "PLAYBOOK" => Ok(Self::Playbook),
            "MODULE" => Ok(Self::Module),
            _ => Err(CoreError::Validation(format!(
                "Unknown execution type: '{s}'. Must be one of: PLAYBOOK, MODULE"
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// InventoryRef
// ---------------------------------------------------------------------------

/// Reference to the inventory a run targets.
///
/// Either the id of a stored inventory or a path / inline host list that
/// is interpreted relative to the project working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InventoryRef {
    Stored(DbId),
    Path(String),
}

impl InventoryRef {
    /// Build a reference from user text. All-digit strings refer to a
    /// stored inventory id.
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        match trimmed.parse::<DbId>() {
            Ok(id) if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) => {
                Self::Stored(id)
            }
            _ => Self::Path(text.to_string()),
        }
    }

    /// Collapse numeric path strings into stored references.
    pub fn normalized(self) -> Self {
        match self {
            Self::Path(text) => Self::from_text(&text),
            stored => stored,
        }
    }

    pub fn stored_id(&self) -> Option<DbId> {
        match self {
            Self::Stored(id) => Some(*id),
            Self::Path(_) => None,
        }
    }
}

impl std::fmt::Display for InventoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stored(id) => write!(f, "{id}"),
            Self::Path(path) => f.write_str(path),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionRequest
// ---------------------------------------------------------------------------

/// A fully specified playbook or module run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub kind: ExecutionKind,
    /// Playbook path (relative to the project dir) or module name.
    pub target: String,
    /// Host pattern for module runs. Ignored for playbooks.
    pub group: String,
    /// Module arguments (`-a`). Ignored for playbooks.
    pub args: String,
    pub inventory: InventoryRef,
    /// ansible command line options (`forks`, `limit`, ...).
    pub vars: Variables,
}

impl ExecutionRequest {
    pub fn playbook(target: impl Into<String>, inventory: InventoryRef) -> Self {
        Self {
            kind: ExecutionKind::Playbook,
            target: target.into(),
            group: DEFAULT_MODULE_GROUP.to_string(),
            args: String::new(),
            inventory,
            vars: Variables::new(),
        }
    }

    pub fn module(target: impl Into<String>, inventory: InventoryRef) -> Self {
        Self {
            kind: ExecutionKind::Module,
            target: target.into(),
            group: DEFAULT_MODULE_GROUP.to_string(),
            args: String::new(),
            inventory,
            vars: Variables::new(),
        }
    }

    /// Module run described by a stored variable set.
    ///
    /// `group` and `args` entries become the host pattern and the module
    /// arguments; everything else is a command line option.
    pub fn module_from_vars(
        target: impl Into<String>,
        inventory: InventoryRef,
        vars: &Variables,
    ) -> Self {
        let mut request = Self::module(target, inventory);
        if let Some(group) = vars.get(VAR_MODULE_GROUP).filter(|g| !g.trim().is_empty()) {
            request.group = group.trim().to_string();
        }
        if let Some(args) = vars.get(VAR_MODULE_ARGS) {
            request.args = args.clone();
        }
        request.vars = module_options(vars);
        request
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

/// Command line options of a stored module variable set.
pub fn module_options(vars: &Variables) -> Variables {
    vars.iter()
        .filter(|(k, _)| k.as_str() != VAR_MODULE_GROUP && k.as_str() != VAR_MODULE_ARGS)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_module_vars_carry_group_and_args() {
        let vars: Variables = [("group", "web"), ("args", "uptime -p"), ("forks", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let request =
            ExecutionRequest::module_from_vars("shell", InventoryRef::Stored(2), &vars);
        assert_eq!(request.group, "web");
        assert_eq!(request.args, "uptime -p");
        assert_eq!(request.vars.len(), 1);
        assert_eq!(request.vars["forks"], "3");

        let bare = ExecutionRequest::module_from_vars("ping", InventoryRef::Stored(2), &Variables::new());
        assert_eq!(bare.group, DEFAULT_MODULE_GROUP);
        assert!(bare.args.is_empty());
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!(
            ExecutionKind::from_str("playbook").unwrap(),
            ExecutionKind::Playbook
        );
        assert_eq!(
            ExecutionKind::from_str("MODULE").unwrap(),
            ExecutionKind::Module
        );
        assert!(ExecutionKind::from_str("REPO").is_err());
    }

    #[test]
    fn numeric_text_is_stored_inventory() {
        assert_eq!(InventoryRef::from_text("12"), InventoryRef::Stored(12));
        assert_eq!(
            InventoryRef::from_text("localhost"),
            InventoryRef::Path("localhost".to_string())
        );
        assert_eq!(
            InventoryRef::from_text("-1"),
            InventoryRef::Path("-1".to_string())
        );
    }

    #[test]
    fn inventory_ref_deserializes_number_and_string() {
        let stored: InventoryRef = serde_json::from_value(serde_json::json!(5)).unwrap();
        assert_eq!(stored, InventoryRef::Stored(5));
        let path: InventoryRef = serde_json::from_value(serde_json::json!("hosts.ini")).unwrap();
        assert_eq!(path, InventoryRef::Path("hosts.ini".to_string()));
        let numeric: InventoryRef = serde_json::from_value(serde_json::json!("7")).unwrap();
        assert_eq!(numeric.normalized(), InventoryRef::Stored(7));
    }

    #[test]
    fn module_request_defaults_to_all_hosts() {
        let req = ExecutionRequest::module("ping", InventoryRef::Stored(1));
        assert_eq!(req.group, "all");
        assert!(req.args.is_empty());
    }
}
