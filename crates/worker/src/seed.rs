//! Startup seed loading.
//!
//! A seed file is a JSON document describing hooks and projects with their
//! hosts, inventories, templates and periodic tasks. Objects are created
//! through the services so the usual lifecycle events fire. Inventories and
//! templates are referenced by name inside their project.
//!
//! ```json
//! {
//!   "hooks": [{"name": "audit", "hook_type": "HTTP",
//!              "recipients": ["https://audit.local/hook"], "when": "after_execution"}],
//!   "projects": [{
//!     "name": "site", "sync": true,
//!     "hosts": [{"name": "web1"}],
//!     "inventories": [{"name": "prod", "hosts": ["web1"]}],
//!     "templates": [{"name": "ping", "kind": "MODULE",
//!                    "data": {"module": "ping", "inventory": "web1,"}}],
//!     "periodic_tasks": [{"name": "hourly", "kind": "TEMPLATE", "template": "ping",
//!                         "schedule": "0 * * * *", "schedule_type": "CRONTAB"}]
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context};
use helmsman_core::execution::InventoryRef;
use helmsman_core::types::DbId;
use helmsman_db::models::hook::CreateHook;
use helmsman_db::models::host::CreateHost;
use helmsman_db::models::inventory::CreateInventory;
use helmsman_db::models::periodic_task::CreatePeriodicTask;
use helmsman_db::models::project::CreateProject;
use helmsman_db::models::template::CreateTemplate;
use helmsman_db::repositories::{HookRepo, HostRepo, InventoryRepo};
use helmsman_pipeline::{ExecutionPipeline, PeriodicTaskService, ProjectService, TemplateService};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub hooks: Vec<CreateHook>,
    #[serde(default)]
    pub projects: Vec<SeedProject>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProject {
    #[serde(flatten)]
    pub project: CreateProject,
    /// Sync the repository right after creation.
    #[serde(default)]
    pub sync: bool,
    #[serde(default)]
    pub hosts: Vec<CreateHost>,
    #[serde(default)]
    pub inventories: Vec<SeedInventory>,
    #[serde(default)]
    pub templates: Vec<CreateTemplate>,
    #[serde(default)]
    pub periodic_tasks: Vec<SeedPeriodicTask>,
}

#[derive(Debug, Deserialize)]
pub struct SeedInventory {
    #[serde(flatten)]
    pub inventory: CreateInventory,
    /// Host names from the project's `hosts`.
    #[serde(default)]
    pub hosts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPeriodicTask {
    #[serde(flatten)]
    pub task: CreatePeriodicTask,
    /// Template name, for TEMPLATE tasks.
    pub template: Option<String>,
    /// Inventory name, used instead of `inventory`.
    pub inventory_name: Option<String>,
}

/// What a seed run created.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub hooks: usize,
    pub projects: usize,
    pub templates: usize,
    pub periodic_tasks: usize,
}

pub async fn load_file(path: &Path) -> anyhow::Result<Seed> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing seed file {}", path.display()))
}

/// Create everything in `seed`. Stops at the first invalid object; a failed
/// repository sync is only logged.
pub async fn apply(pipeline: &ExecutionPipeline, seed: Seed) -> anyhow::Result<SeedSummary> {
    let pool = pipeline.pool();
    let projects = ProjectService::new(pipeline.clone());
    let templates = TemplateService::new(pipeline.clone());
    let periodic = PeriodicTaskService::new(pipeline.clone());
    let mut summary = SeedSummary::default();

    for hook in &seed.hooks {
        HookRepo::create(pool, hook)
            .await
            .with_context(|| format!("creating hook '{}'", hook.name))?;
        summary.hooks += 1;
    }

    for entry in seed.projects {
        let project = projects
            .create(&entry.project)
            .await
            .with_context(|| format!("creating project '{}'", entry.project.name))?;
        summary.projects += 1;

        if entry.sync {
            if let Err(e) = projects.sync(project.id).await {
                tracing::warn!(project_id = project.id, error = %e, "Seed: initial sync failed");
            }
        }

        let mut host_ids: HashMap<String, DbId> = HashMap::new();
        for host in &entry.hosts {
            let created = HostRepo::create(pool, project.id, host)
                .await
                .with_context(|| format!("creating host '{}'", host.name))?;
            host_ids.insert(created.name.clone(), created.id);
        }

        let mut inventory_ids: HashMap<String, DbId> = HashMap::new();
        for inventory in &entry.inventories {
            let created = InventoryRepo::create(pool, project.id, &inventory.inventory)
                .await
                .with_context(|| format!("creating inventory '{}'", inventory.inventory.name))?;
            for name in &inventory.hosts {
                let host_id = host_ids
                    .get(name)
                    .ok_or_else(|| anyhow!("inventory '{}': unknown host '{name}'", created.name))?;
                InventoryRepo::add_host(pool, created.id, *host_id).await?;
            }
            inventory_ids.insert(created.name.clone(), created.id);
        }

        let mut template_ids: HashMap<String, DbId> = HashMap::new();
        for template in &entry.templates {
            let created = templates
                .create(project.id, template)
                .await
                .with_context(|| format!("creating template '{}'", template.name))?;
            template_ids.insert(created.name.clone(), created.id);
            summary.templates += 1;
        }

        for seed_task in entry.periodic_tasks {
            let mut task = seed_task.task;
            if let Some(name) = &seed_task.template {
                let id = template_ids
                    .get(name)
                    .ok_or_else(|| anyhow!("periodic task '{}': unknown template '{name}'", task.name))?;
                task.template_id = Some(*id);
            }
            if let Some(name) = &seed_task.inventory_name {
                let id = inventory_ids
                    .get(name)
                    .ok_or_else(|| anyhow!("periodic task '{}': unknown inventory '{name}'", task.name))?;
                task.inventory = Some(InventoryRef::Stored(*id));
            }
            periodic
                .create(project.id, &task)
                .await
                .with_context(|| format!("creating periodic task '{}'", task.name))?;
            summary.periodic_tasks += 1;
        }
    }

    tracing::info!(
        hooks = summary.hooks,
        projects = summary.projects,
        templates = summary.templates,
        periodic_tasks = summary.periodic_tasks,
        "Seed applied"
    );
    Ok(summary)
}
