//! Inventory resolution for executions.
//!
//! An execution names its inventory either by stored id or by a string that
//! is a file inside the project working directory or, failing that, an
//! inline comma-separated host list.

use std::path::{Path, PathBuf};

use helmsman_core::execution::InventoryRef;
use helmsman_core::inventory::ResolvedInventory;
use helmsman_core::paths;
use helmsman_core::types::DbId;
use helmsman_db::models::group::Group;
use helmsman_db::models::host::Host;
use helmsman_db::models::inventory::Inventory;
use helmsman_db::repositories::InventoryRepo;
use helmsman_db::DbPool;

use crate::error::PipelineError;
use crate::workspace::{KeyFiles, RunWorkspace};

/// Where the hosts of a run come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventorySource {
    Stored(DbId),
    /// Inventory file inside the project working directory.
    File(PathBuf),
    /// Comma-separated host list handed to `-i` as is.
    Inline(String),
}

/// A resolved inventory ready to be handed to ansible.
#[derive(Debug, Clone)]
pub struct RenderedInventory {
    pub source: InventorySource,
    /// Snapshot stored on the history entry, secrets masked.
    pub raw_inventory: String,
    resolved: Option<ResolvedInventory>,
}

impl RenderedInventory {
    pub fn inventory_id(&self) -> Option<DbId> {
        match self.source {
            InventorySource::Stored(id) => Some(id),
            _ => None,
        }
    }

    /// Structured document of a stored inventory, secrets masked.
    pub fn document(&self) -> Option<serde_json::Value> {
        self.resolved.as_ref().map(|r| r.redacted().to_json())
    }

    /// Produce the `-i` argument for a run.
    ///
    /// Stored inventories are written to `workspace` with key material
    /// replaced by paths collected in `keys`.
    pub async fn materialize(
        &self,
        workspace: &RunWorkspace,
        keys: &KeyFiles,
    ) -> Result<String, PipelineError> {
        match (&self.source, &self.resolved) {
            (InventorySource::Stored(_), Some(resolved)) => {
                let text = resolved.map_values(|k, v| keys.substitute(k, v)).render_ini();
                let path = workspace
                    .write_private("inventory", &text)
                    .await
                    .map_err(|e| PipelineError::Execution(format!("Cannot write inventory: {e}")))?;
                Ok(path.display().to_string())
            }
            (InventorySource::File(path), _) => Ok(path.display().to_string()),
            (InventorySource::Inline(hosts), _) => Ok(inline_arg(hosts)),
            (InventorySource::Stored(id), None) => Err(PipelineError::NotFound {
                entity: "inventory",
                id: *id,
            }),
        }
    }
}

/// Check an inventory reference without resolving it.
///
/// Paths must stay inside the project directory; stored inventories must
/// exist and belong to the project.
pub async fn check(
    pool: &DbPool,
    project_id: DbId,
    project_dir: &Path,
    inventory: &InventoryRef,
) -> Result<(), PipelineError> {
    match inventory {
        InventoryRef::Stored(id) => {
            owned_inventory(pool, project_id, *id).await?;
        }
        InventoryRef::Path(text) => {
            paths::resolve_within(project_dir, text.trim())?;
        }
    }
    Ok(())
}

pub async fn resolve(
    pool: &DbPool,
    project_id: DbId,
    project_dir: &Path,
    inventory: &InventoryRef,
) -> Result<RenderedInventory, PipelineError> {
    match inventory {
        InventoryRef::Stored(id) => {
            owned_inventory(pool, project_id, *id).await?;
            let graph = InventoryRepo::load_graph(pool, *id)
                .await?
                .ok_or(PipelineError::NotFound {
                    entity: "inventory",
                    id: *id,
                })?;
            let resolved = graph.resolve()?;
            Ok(RenderedInventory {
                source: InventorySource::Stored(*id),
                raw_inventory: resolved.redacted().render_ini(),
                resolved: Some(resolved),
            })
        }
        InventoryRef::Path(text) => {
            let text = text.trim();
            let path = paths::resolve_within(project_dir, text)?;
            let source = if tokio::fs::metadata(&path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false)
            {
                InventorySource::File(path)
            } else {
                if text.is_empty() {
                    return Err(PipelineError::Validation(
                        helmsman_core::template::INVENTORY_REQUIRED_MSG.to_string(),
                    ));
                }
                InventorySource::Inline(text.to_string())
            };
            Ok(RenderedInventory {
                source,
                raw_inventory: text.to_string(),
                resolved: None,
            })
        }
    }
}

/// Every host reachable from a stored inventory, each object once, with
/// secret variables masked.
pub async fn all_hosts(pool: &DbPool, inventory_id: DbId) -> Result<Vec<Host>, PipelineError> {
    let hosts = InventoryRepo::all_hosts(pool, inventory_id).await?;
    Ok(hosts.iter().map(Host::redacted).collect())
}

/// Every group reachable from a stored inventory, each object once, with
/// secret variables masked.
pub async fn all_groups(pool: &DbPool, inventory_id: DbId) -> Result<Vec<Group>, PipelineError> {
    let groups = InventoryRepo::all_groups(pool, inventory_id).await?;
    Ok(groups.iter().map(Group::redacted).collect())
}

async fn owned_inventory(
    pool: &DbPool,
    project_id: DbId,
    id: DbId,
) -> Result<Inventory, PipelineError> {
    InventoryRepo::find_by_id(pool, id)
        .await?
        .filter(|inv| inv.project_id == project_id)
        .ok_or(PipelineError::NotFound {
            entity: "inventory",
            id,
        })
}

/// `localhost` -> `localhost,` so ansible reads it as a host list.
fn inline_arg(hosts: &str) -> String {
    if hosts.ends_with(',') {
        hosts.to_string()
    } else {
        format!("{hosts},")
    }
}
