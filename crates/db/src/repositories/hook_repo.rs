//! Repository for hooks.

use chrono::Utc;
use helmsman_core::hooks::{self, HookWhen};
use helmsman_core::types::DbId;

use super::validate_name;
use crate::models::hook::{CreateHook, Hook, UpdateHook};
use crate::{DbError, DbPool};

pub struct HookRepo;

impl HookRepo {
    pub async fn create(pool: &DbPool, input: &CreateHook) -> Result<Hook, DbError> {
        validate_name("Hook", &input.name)?;
        hooks::validate_recipients(input.hook_type, &input.recipients)?;
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        Ok(tables.hooks.insert_with(|id| Hook {
            id,
            name: input.name.clone(),
            hook_type: input.hook_type,
            recipients: input.recipients.clone(),
            when: input.when,
            enabled: input.enabled,
            created_at: now,
            updated_at: now,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Hook>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.hooks.rows.get(&id).cloned())
    }

    pub async fn list(pool: &DbPool) -> Result<Vec<Hook>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.hooks.rows.values().cloned().collect())
    }

    /// Enabled hooks subscribed to `when`.
    pub async fn list_enabled_for(pool: &DbPool, when: HookWhen) -> Result<Vec<Hook>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .hooks
            .rows
            .values()
            .filter(|h| h.enabled && h.when == when)
            .cloned()
            .collect())
    }

    pub async fn update(
        pool: &DbPool,
        id: DbId,
        input: &UpdateHook,
    ) -> Result<Option<Hook>, DbError> {
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.hooks.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            validate_name("Hook", name)?;
        }
        if let Some(recipients) = &input.recipients {
            hooks::validate_recipients(row.hook_type, recipients)?;
        }
        if let Some(name) = &input.name {
            row.name = name.clone();
        }
        if let Some(recipients) = &input.recipients {
            row.recipients = recipients.clone();
        }
        if let Some(when) = input.when {
            row.when = when;
        }
        if let Some(enabled) = input.enabled {
            row.enabled = enabled;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        Ok(tables.hooks.rows.remove(&id).is_some())
    }
}
