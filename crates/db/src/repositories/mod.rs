//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&DbPool` as the first argument.

pub mod group_repo;
pub mod history_repo;
pub mod hook_delivery_repo;
pub mod hook_repo;
pub mod host_repo;
pub mod inventory_repo;
pub mod periodic_task_repo;
pub mod playbook_repo;
pub mod project_repo;
pub mod template_repo;

pub use group_repo::GroupRepo;
pub use history_repo::HistoryRepo;
pub use hook_delivery_repo::HookDeliveryRepo;
pub use hook_repo::HookRepo;
pub use host_repo::HostRepo;
pub use inventory_repo::InventoryRepo;
pub use periodic_task_repo::PeriodicTaskRepo;
pub use playbook_repo::PlaybookRepo;
pub use project_repo::ProjectRepo;
pub use template_repo::TemplateRepo;

use helmsman_core::variables::{self, Variables};

use crate::DbError;

/// Check every key of a variable map.
pub(crate) fn validate_vars(vars: &Variables) -> Result<(), DbError> {
    for key in vars.keys() {
        variables::validate_key(key)?;
    }
    Ok(())
}

pub(crate) fn validate_name(entity: &str, name: &str) -> Result<(), DbError> {
    if name.trim().is_empty() {
        return Err(DbError::validation(format!("{entity} name must not be empty")));
    }
    Ok(())
}
