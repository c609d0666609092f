use helmsman_core::error::CoreError;
use helmsman_core::types::DbId;
use helmsman_db::DbError;

use crate::repo::RepoError;

/// Errors surfaced by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Bad input. No history entry was created or advanced.
    #[error("{0}")]
    Validation(String),

    /// Repository synchronization failed.
    #[error("Sync failed: {0}")]
    Sync(#[from] RepoError),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Execution {0} was interrupted")]
    Interrupted(DbId),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: DbId },

    /// The operation does not apply to the entity in its current state.
    #[error("{0}")]
    InvalidState(String),

    /// Output is not available yet.
    #[error("{0}")]
    NotReady(String),

    #[error("Storage error: {0}")]
    Db(DbError),
}

impl PipelineError {
    /// HTTP status code a collaborator should map this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound { .. } => 404,
            Self::InvalidState(_) => 409,
            Self::NotReady(_) => 424,
            Self::Sync(_) | Self::Execution(_) | Self::Interrupted(_) | Self::Db(_) => 500,
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            CoreError::Conflict(msg) => Self::InvalidState(msg),
            CoreError::NotReady(msg) => Self::NotReady(msg),
            CoreError::Internal(msg) => Self::Execution(msg),
        }
    }
}

impl From<DbError> for PipelineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => Self::NotFound { entity, id },
            DbError::Core(core) => core.into(),
            other => Self::Db(other),
        }
    }
}
