use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("conflict")]
    Conflict,
}

impl DomainError {
    /// Store failures are the only errors worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Store(_))
    }
}
