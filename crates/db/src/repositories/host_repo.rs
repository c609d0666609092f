//! Repository for hosts.

use chrono::Utc;
use helmsman_core::hosts;
use helmsman_core::types::DbId;

use super::validate_vars;
use crate::models::host::{CreateHost, Host, UpdateHost};
use crate::{DbError, DbPool};

pub struct HostRepo;

impl HostRepo {
    pub async fn create(
        pool: &DbPool,
        project_id: DbId,
        input: &CreateHost,
    ) -> Result<Host, DbError> {
        hosts::validate_host_name(input.kind, &input.name)?;
        validate_vars(&input.vars)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        Ok(tables.hosts.insert_with(|id| Host {
            id,
            project_id,
            name: input.name.clone(),
            kind: input.kind,
            vars: input.vars.clone(),
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Host>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.hosts.rows.get(&id).cloned())
    }

    pub async fn list_by_project(pool: &DbPool, project_id: DbId) -> Result<Vec<Host>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .hosts
            .rows
            .values()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect())
    }

    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateHost,
    ) -> Result<Option<Host>, DbError> {
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.hosts.rows.get_mut(&id) else {
            return Ok(None);
        };
        let name = input.name.clone().unwrap_or_else(|| row.name.clone());
        let kind = input.kind.unwrap_or(row.kind);
        hosts::validate_host_name(kind, &name)?;
        if let Some(vars) = &input.vars {
            validate_vars(vars)?;
            row.vars = vars.clone();
        }
        row.name = name;
        row.kind = kind;
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    /// Delete a host and unlink it from every group and inventory.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        if tables.hosts.rows.remove(&id).is_none() {
            return Ok(false);
        }
        for group in tables.groups.rows.values_mut() {
            group.hosts.retain(|h| *h != id);
        }
        for inventory in tables.inventories.rows.values_mut() {
            inventory.hosts.retain(|h| *h != id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use helmsman_core::hosts::HostKind;
    use helmsman_core::variables::Variables;

    use super::*;
    use crate::create_pool;
    use crate::models::project::CreateProject;
    use crate::repositories::ProjectRepo;

    async fn project(pool: &DbPool) -> DbId {
        ProjectRepo::create(
            pool,
            &CreateProject {
                name: "p".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn range_host_validated() {
        let pool = create_pool();
        let pid = project(&pool).await;
        let ok = CreateHost {
            name: "10.0.0.[1:4]".into(),
            kind: HostKind::Range,
            vars: Variables::new(),
        };
        assert!(HostRepo::create(&pool, pid, &ok).await.is_ok());
        let bad = CreateHost {
            name: "10.0.0.[4:1]".into(),
            kind: HostKind::Range,
            vars: Variables::new(),
        };
        assert!(HostRepo::create(&pool, pid, &bad).await.is_err());
    }

    #[tokio::test]
    async fn host_needs_project() {
        let pool = create_pool();
        let input = CreateHost {
            name: "db1".into(),
            kind: HostKind::Host,
            vars: Variables::new(),
        };
        assert!(matches!(
            HostRepo::create(&pool, 42, &input).await,
            Err(DbError::NotFound { entity: "project", id: 42 })
        ));
    }
}
