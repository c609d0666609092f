//! Hook and hook delivery models and DTOs.

use helmsman_core::hooks::{HookType, HookWhen};
use helmsman_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Hook {
    pub id: DbId,
    pub name: String,
    pub hook_type: HookType,
    /// URLs for HTTP hooks, script file names for SCRIPT hooks.
    pub recipients: Vec<String>,
    pub when: HookWhen,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHook {
    pub name: String,
    pub hook_type: HookType,
    pub recipients: Vec<String>,
    pub when: HookWhen,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHook {
    pub name: Option<String>,
    pub recipients: Option<Vec<String>>,
    pub when: Option<HookWhen>,
    pub enabled: Option<bool>,
}

/// Outcome of delivering one event to one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct HookDelivery {
    pub id: DbId,
    pub hook_id: DbId,
    pub event: HookWhen,
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHookDelivery {
    pub hook_id: DbId,
    pub event: HookWhen,
    pub recipient: String,
    pub success: bool,
    pub error: Option<String>,
}
