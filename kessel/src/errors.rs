use crate::relations::RelationsError;

#[derive(thiserror::Error, Debug)]
pub enum AuthorizationError {
    /// The authorization service answered, and the answer was not "allowed".
    #[error("forbidden")]
    Forbidden,

    /// A denial on a single integration, reported as absence so callers
    /// cannot probe for resources they cannot see.
    #[error("{body}")]
    NotFound { body: String },

    #[error("authorization service call failed: {0}")]
    Relations(#[from] RelationsError),

    #[error("invalid resource id {id:?} in lookup response: {source}")]
    InvalidResourceId {
        id: String,
        #[source]
        source: uuid::Error,
    },

    #[error("authorization back-end failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthorizationError {
    pub fn integration_not_found() -> Self {
        AuthorizationError::NotFound {
            body: serde_json::json!({ "error": "Integration not found" }).to_string(),
        }
    }
}
