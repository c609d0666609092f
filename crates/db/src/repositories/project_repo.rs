//! Repository for projects.

use chrono::Utc;
use helmsman_core::project::{self, ProjectStatus};
use helmsman_core::types::DbId;

use super::{validate_name, validate_vars};
use crate::models::project::{CreateProject, Project, UpdateProject};
use crate::{DbError, DbPool};

pub struct ProjectRepo;

impl ProjectRepo {
    /// Create a new project in status NEW.
    pub async fn create(pool: &DbPool, input: &CreateProject) -> Result<Project, DbError> {
        validate_name("Project", &input.name)?;
        validate_vars(&input.vars)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        Ok(tables.projects.insert_with(|id| Project {
            id,
            name: input.name.clone(),
            repository: input.repository.clone(),
            status: ProjectStatus::New,
            vars: input.vars.clone(),
            revision: None,
            branch: None,
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Project>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.projects.rows.get(&id).cloned())
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<Project>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.projects.rows.values().cloned().collect())
    }

    /// Patch a project. Returns `None` if it does not exist.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateProject,
    ) -> Result<Option<Project>, DbError> {
        if let Some(name) = &input.name {
            validate_name("Project", name)?;
        }
        if let Some(vars) = &input.vars {
            validate_vars(vars)?;
        }
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.projects.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            row.name = name.clone();
        }
        if let Some(repository) = &input.repository {
            row.repository = repository.clone();
        }
        if let Some(vars) = &input.vars {
            row.vars = vars.clone();
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    /// Move a project to `status`, enforcing the sync state machine.
    pub async fn set_status(
        pool: &DbPool,
        id: DbId,
        status: ProjectStatus,
    ) -> Result<Project, DbError> {
        let mut tables = pool.tables.write().await;
        let row = tables
            .projects
            .rows
            .get_mut(&id)
            .ok_or(DbError::NotFound {
                entity: "project",
                id,
            })?;
        project::validate_transition(row.status, status)?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    /// Record the revision and branch produced by a successful sync.
    pub async fn set_revision(
        pool: &DbPool,
        id: DbId,
        revision: &str,
        branch: Option<&str>,
    ) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        let row = tables
            .projects
            .rows
            .get_mut(&id)
            .ok_or(DbError::NotFound {
                entity: "project",
                id,
            })?;
        row.revision = Some(revision.to_string());
        row.branch = branch.map(str::to_string);
        row.updated_at = Utc::now();
        Ok(())
    }

    /// Delete a project and every host, group, inventory, template and
    /// periodic task it owns. History is kept.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        if tables.projects.rows.remove(&id).is_none() {
            return Ok(false);
        }
        tables.hosts.rows.retain(|_, h| h.project_id != id);
        tables.groups.rows.retain(|_, g| g.project_id != id);
        tables.inventories.rows.retain(|_, i| i.project_id != id);
        tables.templates.rows.retain(|_, t| t.project_id != id);
        tables.periodic_tasks.rows.retain(|_, p| p.project_id != id);
        tables.playbooks.rows.retain(|_, p| p.project_id != id);
        Ok(true)
    }
}
