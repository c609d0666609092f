//! Inventory entity model and DTOs.

use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables::{self, Variables};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub vars: Variables,
    pub hosts: Vec<DbId>,
    pub groups: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Inventory {
    pub fn redacted_vars(&self) -> Variables {
        variables::redacted(&self.vars)
    }

    pub fn redacted(&self) -> Self {
        Self {
            vars: self.redacted_vars(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInventory {
    pub name: String,
    #[serde(default)]
    pub vars: Variables,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateInventory {
    pub name: Option<String>,
    pub vars: Option<Variables>,
}
