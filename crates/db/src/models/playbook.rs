//! Playbook catalog entries.

use helmsman_core::types::{DbId, Timestamp};
use serde::Serialize;

/// A playbook found in a project's working directory by the last
/// successful sync.
#[derive(Debug, Clone, Serialize)]
pub struct Playbook {
    pub id: DbId,
    pub project_id: DbId,
    /// File name without its extension.
    pub name: String,
    /// Path relative to the working directory, as passed to
    /// `ansible-playbook`.
    pub playbook: String,
    pub created_at: Timestamp,
}
