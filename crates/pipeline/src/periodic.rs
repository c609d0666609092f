//! Periodic tasks: CRUD with lifecycle events, due-task selection and
//! launching.

use helmsman_core::execution::{ExecutionRequest, InventoryRef};
use helmsman_core::hooks::HookWhen;
use helmsman_core::schedule::{PeriodicKind, Schedule};
use helmsman_core::template::INVENTORY_REQUIRED_MSG;
use helmsman_core::types::{DbId, Timestamp};
use helmsman_core::variables;
use helmsman_db::models::periodic_task::{CreatePeriodicTask, PeriodicTask, UpdatePeriodicTask};
use helmsman_db::repositories::{PeriodicTaskRepo, TemplateRepo};
use helmsman_db::DbPool;

use crate::error::PipelineError;
use crate::pipeline::{ExecutionOrigin, ExecutionPipeline};

const ENTITY: &str = "periodic_task";

#[derive(Clone)]
pub struct PeriodicTaskService {
    pipeline: ExecutionPipeline,
}

impl PeriodicTaskService {
    pub fn new(pipeline: ExecutionPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pool(&self) -> &DbPool {
        self.pipeline.pool()
    }

    pub async fn create(
        &self,
        project_id: DbId,
        input: &CreatePeriodicTask,
    ) -> Result<PeriodicTask, PipelineError> {
        let task = PeriodicTaskRepo::create(self.pipeline.pool(), project_id, input).await?;
        tracing::info!(
            task_id = task.id,
            project_id,
            schedule = %task.schedule,
            schedule_type = ?task.schedule_type,
            "Periodic task created"
        );
        self.pipeline
            .publish_object(HookWhen::OnObjectAdd, ENTITY, task.id, payload(&task));
        Ok(task.redacted())
    }

    /// The task with secret variables masked.
    pub async fn get(&self, id: DbId) -> Result<PeriodicTask, PipelineError> {
        Ok(self.load(id).await?.redacted())
    }

    pub async fn update(
        &self,
        id: DbId,
        input: &UpdatePeriodicTask,
    ) -> Result<PeriodicTask, PipelineError> {
        let task = PeriodicTaskRepo::update(self.pipeline.pool(), id, input)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })?;
        self.pipeline
            .publish_object(HookWhen::OnObjectUpd, ENTITY, id, payload(&task));
        Ok(task.redacted())
    }

    pub async fn delete(&self, id: DbId) -> Result<(), PipelineError> {
        let task = self.load(id).await?;
        PeriodicTaskRepo::delete(self.pipeline.pool(), id).await?;
        self.pipeline
            .publish_object(HookWhen::OnObjectDel, ENTITY, id, payload(&task));
        Ok(())
    }

    /// Enabled tasks whose schedule fires at `now`.
    ///
    /// Tasks with a schedule that no longer parses are logged and skipped.
    pub async fn due_tasks(&self, now: Timestamp) -> Result<Vec<PeriodicTask>, PipelineError> {
        let tasks = PeriodicTaskRepo::list_enabled(self.pipeline.pool()).await?;
        Ok(tasks
            .into_iter()
            .filter(|task| match Schedule::parse(task.schedule_type, &task.schedule) {
                Ok(schedule) => schedule.is_due(now, task.last_run),
                Err(e) => {
                    tracing::warn!(task_id = task.id, error = %e, "Skipping task with invalid schedule");
                    false
                }
            })
            .collect())
    }

    /// Launch one run of `task`. Returns the history id and the inventory
    /// the run targets.
    pub async fn run_task(&self, task: &PeriodicTask) -> Result<(DbId, InventoryRef), PipelineError> {
        let request = self.request_for(task).await?;
        let inventory = request.inventory.clone();
        let history_id = self
            .pipeline
            .execute(
                task.project_id,
                request,
                ExecutionOrigin::scheduler(task.id, task.template_option.clone()),
            )
            .await?;
        tracing::info!(task_id = task.id, history_id, %inventory, "Periodic task launched");
        Ok((history_id, inventory))
    }

    /// Run a task immediately, outside its schedule.
    pub async fn execute_now(&self, id: DbId) -> Result<(DbId, String), PipelineError> {
        let task = self.load(id).await?;
        let (history_id, inventory) = self.run_task(&task).await?;
        Ok((history_id, format!("Started at inventory {inventory}.")))
    }

    async fn load(&self, id: DbId) -> Result<PeriodicTask, PipelineError> {
        PeriodicTaskRepo::find_by_id(self.pipeline.pool(), id)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })
    }

    async fn request_for(&self, task: &PeriodicTask) -> Result<ExecutionRequest, PipelineError> {
        match task.kind {
            PeriodicKind::Template => {
                let template_id = task.template_id.ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Periodic task {} has no template",
                        task.id
                    ))
                })?;
                let template = TemplateRepo::find_by_id(self.pipeline.pool(), template_id)
                    .await?
                    .ok_or(PipelineError::NotFound {
                        entity: "template",
                        id: template_id,
                    })?;
                let request = template
                    .definition()
                    .expand(task.template_option.as_deref())?;
                let vars = variables::merge([&request.vars, &task.vars]);
                Ok(ExecutionRequest { vars, ..request })
            }
            PeriodicKind::Playbook | PeriodicKind::Module => {
                let inventory = task
                    .inventory
                    .clone()
                    .ok_or_else(|| PipelineError::Validation(INVENTORY_REQUIRED_MSG.to_string()))?;
                if task.kind == PeriodicKind::Module {
                    return Ok(ExecutionRequest::module_from_vars(
                        task.mode.clone(),
                        inventory,
                        &task.vars,
                    ));
                }
                Ok(ExecutionRequest {
                    vars: task.vars.clone(),
                    ..ExecutionRequest::playbook(task.mode.clone(), inventory)
                })
            }
        }
    }
}

fn payload(task: &PeriodicTask) -> serde_json::Value {
    serde_json::to_value(task.redacted()).unwrap_or(serde_json::Value::Null)
}
