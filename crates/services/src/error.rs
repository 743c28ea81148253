//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use typing_core::model::EventError;
use typing_core::progression::ProgressionError;

/// Errors returned by the request handlers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("no authenticated account")]
    Unauthorized,
    #[error("account not found")]
    NotFound,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("too many submissions, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("account changed while the submission was processed")]
    Conflict,
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl ServiceError {
    /// Stable machine-readable code for responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::NotFound => "not_found",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::RateLimited { .. } => "rate_limited",
            ServiceError::Conflict => "conflict",
            ServiceError::InternalFailure(_) => "internal_failure",
        }
    }

    /// Whether resubmitting the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::RateLimited { .. }
                | ServiceError::Conflict
                | ServiceError::InternalFailure(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ServiceError::NotFound,
            StorageError::Conflict => ServiceError::Conflict,
            other => ServiceError::InternalFailure(other.to_string()),
        }
    }
}

impl From<EventError> for ServiceError {
    fn from(err: EventError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<ProgressionError> for ServiceError {
    fn from(err: ProgressionError) -> Self {
        match err {
            ProgressionError::WpmTooHigh { .. } | ProgressionError::WrongEventKind { .. } => {
                ServiceError::InvalidInput(err.to_string())
            }
            other => ServiceError::InternalFailure(other.to_string()),
        }
    }
}
