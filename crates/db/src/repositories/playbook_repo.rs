//! Repository for the per-project playbook catalog.

use chrono::Utc;
use helmsman_core::types::DbId;

use crate::models::playbook::Playbook;
use crate::{DbError, DbPool};

pub struct PlaybookRepo;

impl PlaybookRepo {
    /// Replace the catalog of a project with `files`.
    pub async fn replace_for_project(
        pool: &DbPool,
        project_id: DbId,
        files: &[String],
    ) -> Result<Vec<Playbook>, DbError> {
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        if !tables.projects.rows.contains_key(&project_id) {
            return Err(DbError::NotFound {
                entity: "project",
                id: project_id,
            });
        }
        tables.playbooks.rows.retain(|_, p| p.project_id != project_id);
        Ok(files
            .iter()
            .map(|file| {
                tables.playbooks.insert_with(|id| Playbook {
                    id,
                    project_id,
                    name: playbook_name(file),
                    playbook: file.clone(),
                    created_at: now,
                })
            })
            .collect())
    }

    /// Catalog of a project, ordered by file name.
    pub async fn list_by_project(pool: &DbPool, project_id: DbId) -> Result<Vec<Playbook>, DbError> {
        let tables = pool.tables.read().await;
        let mut playbooks: Vec<Playbook> = tables
            .playbooks
            .rows
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        playbooks.sort_by(|a, b| a.playbook.cmp(&b.playbook));
        Ok(playbooks)
    }
}

fn playbook_name(file: &str) -> String {
    file.strip_suffix(".yml")
        .or_else(|| file.strip_suffix(".yaml"))
        .unwrap_or(file)
        .to_string()
}
