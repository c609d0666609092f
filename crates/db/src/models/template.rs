//! Execution template model and DTOs.

use std::collections::BTreeMap;

use helmsman_core::template::{TemplateData, TemplateDefinition, TemplateKind};
use helmsman_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub kind: TemplateKind,
    pub data: TemplateData,
    pub options: BTreeMap<String, TemplateData>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Template {
    /// Copy with sensitive data and option vars masked.
    pub fn redacted(&self) -> Self {
        Self {
            data: self.data.redacted(),
            options: self.definition().redacted_options(),
            ..self.clone()
        }
    }

    pub fn definition(&self) -> TemplateDefinition {
        TemplateDefinition {
            kind: self.kind,
            data: self.data.clone(),
            options: self.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    pub kind: TemplateKind,
    pub data: TemplateData,
    #[serde(default)]
    pub options: BTreeMap<String, TemplateData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    pub data: Option<TemplateData>,
    pub options: Option<BTreeMap<String, TemplateData>>,
}
