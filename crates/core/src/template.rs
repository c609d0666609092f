//! Execution templates and named option overlays.
//!
//! A template stores execution defaults (`data`) plus named partial
//! overlays (`options`). Expanding a template with an option applies the
//! overlay section by section: target keys and inventory are replaced,
//! `vars` are merged key by key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::arguments;
use crate::error::CoreError;
use crate::execution::{ExecutionKind, ExecutionRequest, InventoryRef, DEFAULT_MODULE_GROUP};
use crate::variables::{self, Variables, REDACTED_MARKER};

pub const INVENTORY_REQUIRED_MSG: &str = "Inventory have to set.";

// ---------------------------------------------------------------------------
// TemplateKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    Task,
    Module,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Module => "Module",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "Task" => Ok(Self::Task),
            "Module" => Ok(Self::Module),
            _ => Err(CoreError::Validation(format!(
                "Invalid template kind: '{s}'. Must be one of: Task, Module"
            ))),
        }
    }

    pub fn execution_kind(&self) -> ExecutionKind {
        match self {
            Self::Task => ExecutionKind::Playbook,
            Self::Module => ExecutionKind::Module,
        }
    }
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TemplateData
// ---------------------------------------------------------------------------

/// Execution defaults of a template, or a partial overlay of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,
}

impl TemplateData {
    /// Apply `overlay` on top of `self`.
    pub fn overlay(&self, overlay: &TemplateData) -> TemplateData {
        let mut out = self.clone();
        if overlay.playbook.is_some() {
            out.playbook = overlay.playbook.clone();
        }
        if overlay.module.is_some() {
            out.module = overlay.module.clone();
        }
        if overlay.group.is_some() {
            out.group = overlay.group.clone();
        }
        if overlay.args.is_some() {
            out.args = overlay.args.clone();
        }
        if overlay.inventory.is_some() {
            out.inventory = overlay.inventory.clone();
        }
        for (k, v) in &overlay.vars {
            out.vars.insert(k.clone(), v.clone());
        }
        out
    }

    /// `vars` as flat strings.
    pub fn string_vars(&self) -> Variables {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), variables::value_to_string(v)))
            .collect()
    }

    /// Copy with sensitive `vars` replaced by the redaction marker.
    pub fn redacted(&self) -> TemplateData {
        let mut out = self.clone();
        for (k, v) in out.vars.iter_mut() {
            if variables::is_sensitive(k) {
                *v = Value::String(REDACTED_MARKER.to_string());
            }
        }
        out
    }

    fn target(&self, kind: TemplateKind) -> Option<&str> {
        match kind {
            TemplateKind::Task => self.playbook.as_deref(),
            TemplateKind::Module => self.module.as_deref(),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateDefinition
// ---------------------------------------------------------------------------

/// The expandable part of a stored template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub kind: TemplateKind,
    pub data: TemplateData,
    #[serde(default)]
    pub options: BTreeMap<String, TemplateData>,
}

impl TemplateDefinition {
    /// Check the defaults and every option overlay.
    pub fn validate(&self) -> Result<(), CoreError> {
        check_complete(self.kind, &self.data)?;
        for (name, option) in &self.options {
            if name.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Template option name must not be empty".to_string(),
                ));
            }
            check_complete(self.kind, &self.data.overlay(option)).map_err(|e| match e {
                CoreError::Validation(msg) => {
                    CoreError::Validation(format!("Option '{name}': {msg}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Effective data for `option`. `None` yields `data` unchanged.
    pub fn merged_data(&self, option: Option<&str>) -> Result<TemplateData, CoreError> {
        match option {
            None => Ok(self.data.clone()),
            Some(name) => {
                let overlay = self.options.get(name).ok_or_else(|| {
                    CoreError::Validation(format!("Option '{name}' does not exist in template"))
                })?;
                Ok(self.data.overlay(overlay))
            }
        }
    }

    /// Expand into a concrete execution request.
    pub fn expand(&self, option: Option<&str>) -> Result<ExecutionRequest, CoreError> {
        let data = self.merged_data(option)?;
        check_complete(self.kind, &data)?;
        let inventory = data
            .inventory
            .clone()
            .ok_or_else(|| CoreError::Validation(INVENTORY_REQUIRED_MSG.to_string()))?
            .normalized();
        let target = data.target(self.kind).unwrap_or_default().to_string();
        let request = match self.kind {
            TemplateKind::Task => ExecutionRequest::playbook(target, inventory),
            TemplateKind::Module => ExecutionRequest::module(target, inventory)
                .with_group(
                    data.group
                        .clone()
                        .filter(|g| !g.is_empty())
                        .unwrap_or_else(|| DEFAULT_MODULE_GROUP.to_string()),
                )
                .with_args(data.args.clone().unwrap_or_default()),
        };
        Ok(ExecutionRequest {
            vars: data.string_vars(),
            ..request
        })
    }

    /// Options view with sensitive values masked.
    pub fn redacted_options(&self) -> BTreeMap<String, TemplateData> {
        self.options
            .iter()
            .map(|(name, option)| (name.clone(), option.redacted()))
            .collect()
    }
}

fn check_complete(kind: TemplateKind, data: &TemplateData) -> Result<(), CoreError> {
    if data.target(kind).map_or(true, |t| t.trim().is_empty()) {
        let field = match kind {
            TemplateKind::Task => "playbook",
            TemplateKind::Module => "module",
        };
        return Err(CoreError::Validation(format!(
            "Template of kind {kind} requires '{field}'"
        )));
    }
    if data.inventory.is_none() {
        return Err(CoreError::Validation(INVENTORY_REQUIRED_MSG.to_string()));
    }
    arguments::validate_args(kind.execution_kind(), &data.string_vars())
}
