use thiserror::Error;

#[derive(Error, Debug)]
pub enum GroundedError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, GroundedError>;

impl GroundedError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GroundedError::Transient(_))
    }
}
