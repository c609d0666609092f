//! Repository for execution history.
//!
//! Status changes go through [`HistoryRepo::transition`], a
//! compare-and-set guarded by the history state machine, so exactly one
//! writer can move a given entry forward.

use chrono::Utc;
use helmsman_core::error::CoreError;
use helmsman_core::history::{self, HistoryStatus, TRUNCATED_NOTICE};
use helmsman_core::types::{DbId, Timestamp};

use crate::models::history::{CreateHistory, History, HistoryRunDetails};
use crate::store::Tables;
use crate::{DbError, DbPool};

pub struct HistoryRepo;

impl HistoryRepo {
    /// Create a new entry in DELAY with `start_time` set to now.
    pub async fn create(pool: &DbPool, input: &CreateHistory) -> Result<History, DbError> {
        let now = Utc::now();
        let mut tables = pool.tables.write().await;
        Ok(tables.histories.insert_with(|id| History {
            id,
            project_id: input.project_id,
            mode: input.mode.clone(),
            kind: input.kind,
            status: HistoryStatus::Delay,
            initiator: input.initiator,
            initiator_type: input.initiator_type.clone(),
            inventory_id: input.inventory_id,
            revision: input.revision.clone(),
            options: input.options.clone(),
            raw_args: String::new(),
            raw_stdout: String::new(),
            raw_inventory: String::new(),
            start_time: now,
            stop_time: None,
        }))
    }

    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<History>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables.histories.rows.get(&id).cloned())
    }

    /// Entries of a project, newest first.
    pub async fn list_by_project(pool: &DbPool, project_id: DbId) -> Result<Vec<History>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .histories
            .rows
            .values()
            .rev()
            .filter(|h| h.project_id == project_id)
            .cloned()
            .collect())
    }

    /// Move `id` from `from` to `to`.
    ///
    /// Returns `Ok(false)` without changing anything when the entry is no
    /// longer in `from` (another writer won). Fails when `from -> to` is
    /// not a valid transition. Terminal statuses set `stop_time`.
    pub async fn transition(
        pool: &DbPool,
        id: DbId,
        from: HistoryStatus,
        to: HistoryStatus,
    ) -> Result<bool, DbError> {
        history::validate_transition(from, to)?;
        let mut tables = pool.tables.write().await;
        let row = history_mut(&mut tables, id)?;
        if row.status != from {
            return Ok(false);
        }
        row.status = to;
        if to.is_terminal() {
            row.stop_time = Some(Utc::now());
        }
        tracing::debug!(history_id = id, %from, %to, "History transition");
        Ok(true)
    }

    /// Record the rendered command line and inventory of an entry that has
    /// not finished yet.
    pub async fn set_run_details(
        pool: &DbPool,
        id: DbId,
        details: &HistoryRunDetails,
    ) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        let row = active_mut(&mut tables, id)?;
        row.raw_args = details.raw_args.clone();
        row.raw_inventory = details.raw_inventory.clone();
        if details.revision.is_some() {
            row.revision = details.revision.clone();
        }
        Ok(())
    }

    /// Append output to an entry that has not finished yet.
    pub async fn append_stdout(pool: &DbPool, id: DbId, chunk: &str) -> Result<(), DbError> {
        let mut tables = pool.tables.write().await;
        let row = active_mut(&mut tables, id)?;
        row.raw_stdout.push_str(chunk);
        Ok(())
    }

    /// Replace the stored output of a finished entry with the truncation
    /// notice.
    pub async fn clear(pool: &DbPool, id: DbId) -> Result<History, DbError> {
        let mut tables = pool.tables.write().await;
        let row = history_mut(&mut tables, id)?;
        if row.status.is_active() {
            return Err(DbError::Core(CoreError::NotReady(format!(
                "History {id} is still {}",
                row.status
            ))));
        }
        row.raw_stdout = TRUNCATED_NOTICE.to_string();
        Ok(row.clone())
    }

    /// Entries in `status` that started before `older_than`.
    pub async fn list_stale(
        pool: &DbPool,
        status: HistoryStatus,
        older_than: Timestamp,
    ) -> Result<Vec<History>, DbError> {
        let tables = pool.tables.read().await;
        Ok(tables
            .histories
            .rows
            .values()
            .filter(|h| h.status == status && h.start_time < older_than)
            .cloned()
            .collect())
    }

    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, DbError> {
        let mut tables = pool.tables.write().await;
        let Some(row) = tables.histories.rows.get(&id) else {
            return Ok(false);
        };
        if row.status.is_active() {
            return Err(DbError::Core(CoreError::Conflict(format!(
                "History {id} is still {}",
                row.status
            ))));
        }
        tables.histories.rows.remove(&id);
        Ok(true)
    }
}

fn history_mut(tables: &mut Tables, id: DbId) -> Result<&mut History, DbError> {
    tables.histories.rows.get_mut(&id).ok_or(DbError::NotFound {
        entity: "history",
        id,
    })
}

fn active_mut(tables: &mut Tables, id: DbId) -> Result<&mut History, DbError> {
    let row = history_mut(tables, id)?;
    if !row.status.is_active() {
        return Err(DbError::Core(CoreError::Conflict(format!(
            "History {id} is already {}",
            row.status
        ))));
    }
    Ok(row)
}
