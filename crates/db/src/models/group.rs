//! Group entity model and DTOs.

use helmsman_core::inventory::GroupNode;
use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables::{self, Variables};
use serde::{Deserialize, Serialize};

/// A stored group.
///
/// A group with `children = false` holds hosts, one with `children = true`
/// holds sub-groups. Never both.
#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub children: bool,
    pub vars: Variables,
    pub hosts: Vec<DbId>,
    pub groups: Vec<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Group {
    pub fn redacted_vars(&self) -> Variables {
        variables::redacted(&self.vars)
    }

    pub fn redacted(&self) -> Self {
        Self {
            vars: self.redacted_vars(),
            ..self.clone()
        }
    }

    pub fn to_node(&self) -> GroupNode {
        GroupNode {
            id: self.id,
            name: self.name.clone(),
            children: self.children,
            vars: self.vars.clone(),
            hosts: self.hosts.clone(),
            groups: self.groups.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub children: bool,
    #[serde(default)]
    pub vars: Variables,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub vars: Option<Variables>,
}
