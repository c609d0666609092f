//! Entity structs and DTOs.
//!
//! Each submodule contains:
//! - A `Serialize` entity struct
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches

pub mod group;
pub mod history;
pub mod hook;
pub mod host;
pub mod inventory;
pub mod periodic_task;
pub mod playbook;
pub mod project;
pub mod template;
