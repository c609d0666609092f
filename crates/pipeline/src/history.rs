//! Read-side views over execution history.

use std::collections::BTreeMap;

use helmsman_core::history;
use helmsman_core::types::DbId;
use helmsman_db::models::history::History;
use helmsman_db::repositories::HistoryRepo;
use helmsman_db::DbPool;

use crate::error::PipelineError;

pub struct HistoryService;

impl HistoryService {
    pub async fn get(pool: &DbPool, id: DbId) -> Result<History, PipelineError> {
        HistoryRepo::find_by_id(pool, id)
            .await?
            .ok_or(PipelineError::NotFound {
                entity: "history",
                id,
            })
    }

    /// Stored output, colour codes stripped unless `color` is set.
    pub async fn raw(pool: &DbPool, id: DbId, color: bool) -> Result<String, PipelineError> {
        let entry = Self::get(pool, id).await?;
        Ok(history::raw_view(&entry.raw_stdout, color))
    }

    /// Per-host results parsed from the output of a finished module run.
    pub async fn facts(
        pool: &DbPool,
        id: DbId,
    ) -> Result<BTreeMap<String, serde_json::Value>, PipelineError> {
        let entry = Self::get(pool, id).await?;
        history::facts_gate(entry.kind, entry.status, id)?;
        Ok(history::parse_facts(&entry.raw_stdout))
    }

    /// Replace the output of a finished run with the truncation notice.
    pub async fn clear(pool: &DbPool, id: DbId) -> Result<History, PipelineError> {
        let entry = HistoryRepo::clear(pool, id).await?;
        tracing::info!(history_id = id, "History output cleared");
        Ok(entry)
    }
}
