//! Periodic task model and DTOs.

use helmsman_core::execution::InventoryRef;
use helmsman_core::schedule::{PeriodicKind, ScheduleType};
use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables::{self, Variables};
use serde::{Deserialize, Serialize};

/// A scheduled run of a playbook, module or template.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodicTask {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub kind: PeriodicKind,
    /// Playbook path or module name. Unused for TEMPLATE tasks.
    pub mode: String,
    /// Unused for TEMPLATE tasks.
    pub inventory: Option<InventoryRef>,
    pub schedule: String,
    pub schedule_type: ScheduleType,
    pub template_id: Option<DbId>,
    pub template_option: Option<String>,
    pub vars: Variables,
    pub enabled: bool,
    pub last_run: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PeriodicTask {
    /// Copy with secrets masked.
    pub fn redacted(&self) -> Self {
        Self {
            vars: variables::redacted(&self.vars),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePeriodicTask {
    pub name: String,
    pub kind: PeriodicKind,
    #[serde(default)]
    pub mode: String,
    pub inventory: Option<InventoryRef>,
    #[serde(default)]
    pub schedule: String,
    pub schedule_type: ScheduleType,
    pub template_id: Option<DbId>,
    pub template_option: Option<String>,
    #[serde(default)]
    pub vars: Variables,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePeriodicTask {
    pub name: Option<String>,
    pub mode: Option<String>,
    pub inventory: Option<InventoryRef>,
    pub schedule: Option<String>,
    pub schedule_type: Option<ScheduleType>,
    pub template_option: Option<String>,
    pub vars: Option<Variables>,
    pub enabled: Option<bool>,
}
