//! Execution templates: CRUD with lifecycle events, expansion and runs.

use std::collections::BTreeMap;

use helmsman_core::execution::ExecutionRequest;
use helmsman_core::hooks::HookWhen;
use helmsman_core::template::TemplateData;
use helmsman_core::types::DbId;
use helmsman_db::models::template::{CreateTemplate, Template, UpdateTemplate};
use helmsman_db::repositories::TemplateRepo;

use crate::error::PipelineError;
use crate::pipeline::{ExecutionOrigin, ExecutionPipeline};

const ENTITY: &str = "template";

pub struct TemplateService {
    pipeline: ExecutionPipeline,
}

impl TemplateService {
    pub fn new(pipeline: ExecutionPipeline) -> Self {
        Self { pipeline }
    }

    pub async fn create(
        &self,
        project_id: DbId,
        input: &CreateTemplate,
    ) -> Result<Template, PipelineError> {
        let template = TemplateRepo::create(self.pipeline.pool(), project_id, input).await?;
        tracing::info!(template_id = template.id, project_id, "Template created");
        self.pipeline
            .publish_object(HookWhen::OnObjectAdd, ENTITY, template.id, payload(&template));
        Ok(template.redacted())
    }

    /// The template with sensitive vars masked.
    pub async fn get(&self, id: DbId) -> Result<Template, PipelineError> {
        Ok(self.load(id).await?.redacted())
    }

    pub async fn update(&self, id: DbId, input: &UpdateTemplate) -> Result<Template, PipelineError> {
        let template = TemplateRepo::update(self.pipeline.pool(), id, input)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })?;
        self.pipeline
            .publish_object(HookWhen::OnObjectUpd, ENTITY, id, payload(&template));
        Ok(template.redacted())
    }

    pub async fn delete(&self, id: DbId) -> Result<(), PipelineError> {
        let template = self.load(id).await?;
        TemplateRepo::delete(self.pipeline.pool(), id).await?;
        tracing::info!(template_id = id, "Template deleted");
        self.pipeline
            .publish_object(HookWhen::OnObjectDel, ENTITY, id, payload(&template));
        Ok(())
    }

    /// Concrete request for the template, optionally overlaid with `option`.
    pub async fn expand(
        &self,
        id: DbId,
        option: Option<&str>,
    ) -> Result<ExecutionRequest, PipelineError> {
        let template = self.load(id).await?;
        Ok(template.definition().expand(option)?)
    }

    /// Template options with sensitive values masked.
    pub async fn options_view(&self, id: DbId) -> Result<BTreeMap<String, TemplateData>, PipelineError> {
        Ok(self.load(id).await?.definition().redacted_options())
    }

    /// Run the template and return the history id.
    pub async fn execute(&self, id: DbId, option: Option<&str>) -> Result<DbId, PipelineError> {
        let template = self.load(id).await?;
        let request = template.definition().expand(option)?;
        self.pipeline
            .execute(
                template.project_id,
                request,
                ExecutionOrigin::template(id, option.map(str::to_string)),
            )
            .await
    }

    async fn load(&self, id: DbId) -> Result<Template, PipelineError> {
        TemplateRepo::find_by_id(self.pipeline.pool(), id)
            .await?
            .ok_or(PipelineError::NotFound { entity: ENTITY, id })
    }
}

fn payload(template: &Template) -> serde_json::Value {
    let definition = template.definition();
    serde_json::json!({
        "id": template.id,
        "project_id": template.project_id,
        "name": template.name,
        "kind": template.kind,
        "data": template.data.redacted(),
        "options": definition.redacted_options(),
    })
}
