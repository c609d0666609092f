//! Execution pipeline for helmsman.
//!
//! Turns playbook, module, template and periodic-task requests into
//! supervised ansible runs recorded as history entries, and keeps project
//! working directories in sync with their repositories.

pub mod backend;
pub mod cancellation;
pub mod config;
pub mod error;
pub mod history;
pub mod inventory;
pub mod invocation;
pub mod periodic;
pub mod pipeline;
pub mod projects;
pub mod repo;
pub mod templates;
pub mod workers;
pub mod workspace;

pub use backend::{AnsibleBackend, ExecutionBackend};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use history::HistoryService;
pub use periodic::PeriodicTaskService;
pub use pipeline::{ExecutionOrigin, ExecutionPipeline};
pub use projects::ProjectService;
pub use repo::RepoManager;
pub use templates::TemplateService;
