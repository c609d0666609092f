//! Host entity model and DTOs.

use helmsman_core::hosts::HostKind;
use helmsman_core::inventory::HostNode;
use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables::{self, Variables};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Host {
    pub id: DbId,
    pub project_id: DbId,
    /// Address, or a bracket pattern for RANGE hosts.
    pub name: String,
    pub kind: HostKind,
    pub vars: Variables,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Host {
    pub fn redacted_vars(&self) -> Variables {
        variables::redacted(&self.vars)
    }

    /// Copy with secrets masked.
    pub fn redacted(&self) -> Self {
        Self {
            vars: self.redacted_vars(),
            ..self.clone()
        }
    }

    pub fn to_node(&self) -> HostNode {
        HostNode {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            vars: self.vars.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHost {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: HostKind,
    #[serde(default)]
    pub vars: Variables,
}

fn default_kind() -> HostKind {
    HostKind::Host
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateHost {
    pub name: Option<String>,
    pub kind: Option<HostKind>,
    pub vars: Option<Variables>,
}
