//! Repository for periodic tasks.

use chrono::Utc;
use helmsman_core::arguments;
use helmsman_core::execution::{self, ExecutionKind};
use helmsman_core::schedule::{PeriodicKind, Schedule};
use helmsman_core::template::INVENTORY_REQUIRED_MSG;
use helmsman_core::types::{DbId, Timestamp};

use super::{validate_name, validate_vars};
use crate::models::periodic_task::{CreatePeriodicTask, PeriodicTask, UpdatePeriodicTask};
use crate::store::Tables;
use crate::{DbError, DbPool};

pub struct PeriodicTaskRepo;

impl PeriodicTaskRepo {
    pub async fn create(
        pool: &DbPool,
        project_id: DbId,
        input: &CreatePeriodicTask,
    ) -> Result<PeriodicTask, DbError> {
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        let row = PeriodicTask {
            id: 0,
            project_id,
            name: input.name.clone(),
            kind: input.kind,
            mode: input.mode.clone(),
            inventory: input.inventory.clone().map(|i| i.normalized()),
            schedule: input.schedule.clone(),
            schedule_type: input.schedule_type,
            template_id: input.template_id,
            template_option: input.template_option.clone(),
            vars: input.vars.clone(),
            enabled: input.enabled,
            last_run: None,
            created_at: now,
            updated_at: now,
        };
        validate_task(&tables, &row)?;
        Ok(tables.periodic_tasks.insert_with(|id| PeriodicTask { id, ..row }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<PeriodicTask>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.periodic_tasks.rows.get(&id).cloned())
    }

    pub async fn list_by_project(
        pool: &DbPool,
        project_id: DbId,
    ) -> Result<Vec<PeriodicTask>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .periodic_tasks
            .rows
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    pub async fn list_enabled(pool: &DbPool) -> Result<Vec<PeriodicTask>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .periodic_tasks
            .rows
            .values()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    /// Patch a periodic task. The patched task is validated as a whole.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdatePeriodicTask,
    ) -> Result<Option<PeriodicTask>, DbError> {
        let mut tables = pool.tables.write().await;
        let Some(current) = tables.periodic_tasks.rows.get(&id) else {
            return Ok(None);
        };
        let mut next = current.clone();
        if let Some(name) = &input.name {
            next.name = name.clone();
        }
        if let Some(mode) = &input.mode {
            next.mode = mode.clone();
        }
        if let Some(inventory) = &input.inventory {
            next.inventory = Some(inventory.clone().normalized());
        }
        if let Some(schedule) = &input.schedule {
            next.schedule = schedule.clone();
        }
        if let Some(schedule_type) = input.schedule_type {
            next.schedule_type = schedule_type;
        }
        if let Some(option) = &input.template_option {
            next.template_option = Some(option.clone()).filter(|o| !o.is_empty());
        }
        if let Some(vars) = &input.vars {
            next.vars = vars.clone();
        }
        if let Some(enabled) = input.enabled {
            next.enabled = enabled;
        }
        validate_task(&tables, &next)?;
        next.updated_at = Utc::now();
        tables.periodic_tasks.rows.insert(id, next.clone());
        Ok(Some(next))
    }

    pub async fn set_last_run(pool: &DbPool, id: DbId, at: Timestamp) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        let row = tables
            .periodic_tasks
            .rows
            .get_mut(&id)
            .ok_or(DbError::NotFound {
                entity: "periodic task",
                id,
            })?;
        row.last_run = Some(at);
        Ok(())
    }

    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        Ok(tables.periodic_tasks.rows.remove(&id).is_some())
    }
}

fn validate_task(tables: &Tables, task: &PeriodicTask) -> Result<(), DbError> {
    validate_name("Periodic task", &task.name)?;
    validate_vars(&task.vars)?;
    Schedule::parse(task.schedule_type, &task.schedule)?;
    match task.kind.execution_kind() {
        Some(kind) => {
            if task.mode.trim().is_empty() {
                return Err(DbError::validation("Empty playbook/module name."));
            }
            if task.inventory.is_none() {
                return Err(DbError::validation(INVENTORY_REQUIRED_MSG));
            }
            let options = match kind {
                ExecutionKind::Module => execution::module_options(&task.vars),
                ExecutionKind::Playbook => task.vars.clone(),
            };
            arguments::validate_args(kind, &options)?;
        }
        None => {
            let template_id = task.template_id.ok_or_else(|| {
                DbError::validation(format!(
                    "Periodic task of kind {} requires a template",
                    PeriodicKind::Template
                ))
            })?;
            let template = tables
                .templates
                .rows
                .get(&template_id)
                .filter(|t| t.project_id == task.project_id)
                .ok_or(DbError::NotFound {
                    entity: "template",
                    id: template_id,
                })?;
            if let Some(option) = &task.template_option {
                if !template.options.contains_key(option) {
                    return Err(DbError::validation(format!(
                        "Option '{option}' does not exist in template"
                    )));
                }
            }
        }
    }
    Ok(())
}
