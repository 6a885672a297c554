use thiserror::Error;

use super::BoxFuture;
use crate::error::DomainError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("db unavailable: {0}")]
    Unavailable(String),
    #[error("db operation failed: {0}")]
    Operation(String),
}

impl From<DbError> for DomainError {
    fn from(err: DbError) -> Self {
        DomainError::Store(err.to_string())
    }
}

/// Liveness probe for whichever backend holds the documents.
pub trait DbAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn health_check(&self) -> BoxFuture<'_, Result<(), DbError>>;
}
