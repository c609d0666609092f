use helmsman_core::error::CoreError;
use helmsman_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DbError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Core(CoreError::Validation(msg.into()))
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            DbError::UniqueViolation(msg) => CoreError::Conflict(msg),
            DbError::Core(core) => core,
        }
    }
}
