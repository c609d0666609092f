//! Repository for execution templates.

use chrono::Utc;
use helmsman_core::types::DbId;

use super::validate_name;
use crate::models::template::{CreateTemplate, Template, UpdateTemplate};
use crate::{DbError, DbPool};

pub struct TemplateRepo;

impl TemplateRepo {
    /// Create a template after validating its defaults and every option.
    pub async fn create(
        pool: &DbPool,
        project_id: DbId,
        input: &CreateTemplate,
    ) -> Result<Template, DbError> {
        validate_name("Template", &input.name)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        let row = Template {
            id: 0,
            project_id,
            name: input.name.clone(),
            kind: input.kind,
            data: input.data.clone(),
            options: input.options.clone(),
            created_at: now,
            updated_at: now,
        };
        row.definition().validate()?;
        Ok(tables.templates.insert_with(|id| Template { id, ..row }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Template>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.templates.rows.get(&id).cloned())
    }

    pub async fn list_by_project(
        pool: &DbPool,
        project_id: DbId,
    ) -> Result<Vec<Template>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .templates
            .rows
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect())
    }

    /// Patch a template. The patched template is validated as a whole.
    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateTemplate,
    ) -> Result<Option<Template>, DbError> {
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.templates.rows.get_mut(&id) else {
            return Ok(None);
        };
        let mut next = row.clone();
        if let Some(name) = &input.name {
            validate_name("Template", name)?;
            next.name = name.clone();
        }
        if let Some(data) = &input.data {
            next.data = data.clone();
        }
        if let Some(options) = &input.options {
            next.options = options.clone();
        }
        next.definition().validate()?;
        next.updated_at = Utc::now();
        *row = next.clone();
        Ok(Some(next))
    }

    /// Delete a template. Periodic tasks pointing at it are disabled.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        if tables.templates.rows.remove(&id).is_none() {
            return Ok(false);
        }
        for task in tables.periodic_tasks.rows.values_mut() {
            if task.template_id == Some(id) {
                task.enabled = false;
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use helmsman_core::error::CoreError;
    use helmsman_core::template::{TemplateData, TemplateKind};

    use super::*;
    use crate::create_pool;
    use crate::models::project::CreateProject;
    use crate::repositories::ProjectRepo;

    #[tokio::test]
    async fn template_without_inventory_rejected() {
        let pool = create_pool();
        let pid = ProjectRepo::create(
            &pool,
            &CreateProject {
                name: "p".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id;
        let input = CreateTemplate {
            name: "ping".into(),
            kind: TemplateKind::Module,
            data: TemplateData {
                module: Some("ping".into()),
                ..Default::default()
            },
            options: Default::default(),
        };
        let err = TemplateRepo::create(&pool, pid, &input).await.unwrap_err();
        assert_matches!(err, DbError::Core(CoreError::Validation(ref m)) if m == "Inventory have to set.");
        assert!(TemplateRepo::list_by_project(&pool, pid).await.unwrap().is_empty());
    }
}
