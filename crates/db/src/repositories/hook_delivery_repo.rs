//! Repository for hook delivery records.

use chrono::Utc;
use helmsman_core::types::DbId;

use crate::models::hook::{CreateHookDelivery, HookDelivery};
use crate::{DbError, DbPool};

pub struct HookDeliveryRepo;

impl HookDeliveryRepo {
    pub async fn record(pool: &DbPool, input: &CreateHookDelivery) -> Result<HookDelivery, DbError> {
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        Ok(tables.hook_deliveries.insert_with(|id| HookDelivery {
            id,
            hook_id: input.hook_id,
            event: input.event,
            recipient: input.recipient.clone(),
            success: input.success,
            error: input.error.clone(),
            created_at: now,
        }))
    }

    /// Deliveries of one hook, oldest first.
    pub async fn list_by_hook(pool: &DbPool, hook_id: DbId) -> Result<Vec<HookDelivery>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .hook_deliveries
            .rows
            .values()
            .filter(|d| d.hook_id == hook_id)
            .cloned()
            .collect())
    }
}
