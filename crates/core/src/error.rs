use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity exists but is not in a state that can serve the request
    /// yet (e.g. facts of a history that is still running).
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status code a collaborating API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::NotReady(_) => 424,
            Self::Internal(_) => 500,
        }
    }
}
