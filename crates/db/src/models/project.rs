//! Project entity model and DTOs.

use helmsman_core::project::ProjectStatus;
use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables::{self, Variables};
use serde::{Deserialize, Serialize};

/// A stored project. Its working directory is `<projects_dir>/<id>`.
#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    /// Repository URI (git URL, archive URL or path). Empty for MANUAL.
    pub repository: String,
    pub status: ProjectStatus,
    pub vars: Variables,
    /// Revision of the last successful sync.
    pub revision: Option<String>,
    /// Branch checked out by the last successful sync.
    pub branch: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// Variables with secrets masked.
    pub fn redacted_vars(&self) -> Variables {
        variables::redacted(&self.vars)
    }

    /// Copy safe to hand out on read paths.
    pub fn redacted(&self) -> Self {
        Self {
            vars: self.redacted_vars(),
            ..self.clone()
        }
    }
}

/// DTO for creating a new project. Projects always start as NEW.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub vars: Variables,
}

/// DTO for updating an existing project. All fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub repository: Option<String>,
    /// Replaces the whole variable map.
    pub vars: Option<Variables>,
}
