//! Caller-facing error taxonomy.

use thiserror::Error;

use procflow_infra::command_dispatcher::DispatchError;

/// Error returned by the requisition operations.
///
/// Non-system variants carry enumerable, display-ready reasons. System errors
/// keep their detail out of the display form; the operation aborted with no
/// partial writes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("requisition not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("approver has no pending approval for this requisition")]
    Unauthorized,

    #[error("internal error")]
    System(String),
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(violations) => ServiceError::Validation(violations),
            DispatchError::InvariantViolation(msg) => ServiceError::Conflict(msg),
            DispatchError::Conflict(msg) => ServiceError::Conflict(msg),
            DispatchError::Unauthorized => ServiceError::Unauthorized,
            DispatchError::NotFound => ServiceError::NotFound,
            // Surfaces only once bounded retries are exhausted.
            DispatchError::Concurrency(msg) => {
                ServiceError::Conflict(format!("concurrent modification: {msg}"))
            }
            DispatchError::TenantIsolation(msg) => ServiceError::System(msg),
            DispatchError::Deserialize(msg) => ServiceError::System(msg),
            DispatchError::Store(err) => ServiceError::System(err.to_string()),
        }
    }
}
