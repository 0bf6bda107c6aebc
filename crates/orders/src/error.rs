use domain::{DomainError, ValidationError};
use storage::StorageError;
use thiserror::Error;

/// Errors from order placement.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ValidationError> for OrderError {
    fn from(err: ValidationError) -> Self {
        OrderError::Domain(err.into())
    }
}

impl OrderError {
    /// The validation failure, if that is what this is.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            OrderError::Domain(DomainError::Validation(err)) => Some(err),
            _ => None,
        }
    }
}
