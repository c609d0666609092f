//! Execution history model and DTOs.

use helmsman_core::execution::ExecutionKind;
use helmsman_core::history::HistoryStatus;
use helmsman_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// One playbook or module run.
#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub id: DbId,
    pub project_id: DbId,
    /// Playbook path or module name.
    pub mode: String,
    pub kind: ExecutionKind,
    pub status: HistoryStatus,
    /// Id of the triggering object (template, periodic task), if any.
    pub initiator: Option<DbId>,
    pub initiator_type: String,
    /// Stored inventory id. `None` for path and inline inventories.
    pub inventory_id: Option<DbId>,
    pub revision: Option<String>,
    /// Redacted run options (`vars`, `group`, `args`, `template_option`).
    pub options: serde_json::Value,
    /// Redacted command line.
    pub raw_args: String,
    pub raw_stdout: String,
    /// Rendered inventory with secrets masked.
    pub raw_inventory: String,
    pub start_time: Timestamp,
    pub stop_time: Option<Timestamp>,
}

/// DTO for creating a history entry. Entries always start in DELAY.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateHistory {
    pub project_id: DbId,
    pub mode: String,
    pub kind: ExecutionKind,
    pub initiator: Option<DbId>,
    pub initiator_type: String,
    pub inventory_id: Option<DbId>,
    pub revision: Option<String>,
    pub options: serde_json::Value,
}

/// Details recorded once the invocation has been built.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryRunDetails {
    pub raw_args: String,
    pub raw_inventory: String,
    pub revision: Option<String>,
}
