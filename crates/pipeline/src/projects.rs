//! Project lifecycle: CRUD with lifecycle events, repository sync and
//! direct executions.

use helmsman_core::execution::ExecutionRequest;
use helmsman_core::hooks::HookWhen;
use helmsman_core::types::DbId;
use helmsman_db::models::playbook::Playbook;
use helmsman_db::models::project::{CreateProject, Project, UpdateProject};
use helmsman_db::repositories::{PlaybookRepo, ProjectRepo};

use crate::error::PipelineError;
use crate::pipeline::{ExecutionOrigin, ExecutionPipeline};
use crate::repo::catalog::{self, Readme};

const ENTITY: &str = "project";

pub struct ProjectService {
    pipeline: ExecutionPipeline,
}

impl ProjectService {
    pub fn new(pipeline: ExecutionPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn create(&self, input: &CreateProject) -> Result<Project, PipelineError> {
        let project = ProjectRepo::create(self.pipeline.pool(), input).await?;
        tracing::info!(project_id = project.id, name = %project.name, "Project created");
        self.pipeline
            .publish_object(HookWhen::OnObjectAdd, ENTITY, project.id, payload(&project));
        Ok(project.redacted())
    }

    /// The project with secret variables masked.
    pub async fn get(&self, id: DbId) -> Result<Project, PipelineError> {
        Ok(self.load(id).await?.redacted())
    }

    pub async fn update(&self, id: DbId, input: &UpdateProject) -> Result<Project, PipelineError> {
        let project = ProjectRepo::update(self.pipeline.pool(), id, input)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })?;
        self.pipeline
            .publish_object(HookWhen::OnObjectUpd, ENTITY, id, payload(&project));
        Ok(project.redacted())
    }

    /// Delete the project, everything it owns and its working directory.
    pub async fn delete(&self, id: DbId) -> Result<(), PipelineError> {
        let project = self.load(id).await?;
        ProjectRepo::delete(self.pipeline.pool(), id).await?;

        let dir = self.pipeline.config().project_dir(id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(project_id = id, path = %dir.display(), error = %e, "Failed to remove project dir");
            }
        }
        tracing::info!(project_id = id, "Project deleted");
        self.pipeline
            .publish_object(HookWhen::OnObjectDel, ENTITY, id, payload(&project));
        Ok(())
    }

    /// Fetch the repository into a fresh working directory.
    pub async fn clone_repository(&self, id: DbId) -> Result<Project, PipelineError> {
        let project = self.pipeline.repos().clone_project(self.pipeline.pool(), id).await?;
        Ok(project.redacted())
    }

    pub async fn sync(&self, id: DbId) -> Result<Project, PipelineError> {
        let project = self.pipeline.repos().sync(self.pipeline.pool(), id).await?;
        Ok(project.redacted())
    }

    /// Playbooks found by the last successful sync.
    pub async fn playbooks(&self, id: DbId) -> Result<Vec<Playbook>, PipelineError> {
        self.load(id).await?;
        Ok(PlaybookRepo::list_by_project(self.pipeline.pool(), id).await?)
    }

    /// README at the top of the working directory, if any.
    pub async fn readme(&self, id: DbId) -> Result<Option<Readme>, PipelineError> {
        self.load(id).await?;
        let dir = self.pipeline.config().project_dir(id);
        catalog::read_readme(&dir)
            .await
            .map_err(|e| PipelineError::Execution(format!("Cannot read README: {e}")))
    }

    /// Start a playbook or module run from the project and return the
    /// history id.
    pub async fn execute(&self, id: DbId, request: ExecutionRequest) -> Result<DbId, PipelineError> {
        self.pipeline.execute(id, request, ExecutionOrigin::project()).await
    }

    async fn load(&self, id: DbId) -> Result<Project, PipelineError> {
        ProjectRepo::find_by_id(self.pipeline.pool(), id)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })
    }
}

fn payload(project: &Project) -> serde_json::Value {
    serde_json::to_value(project.redacted()).unwrap_or(serde_json::Value::Null)
}
