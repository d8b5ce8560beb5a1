// Domain Error Types

use crate::domain::JobId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    /// The job list no longer lines up with what a caller expects.
    /// Never repaired, always surfaced to the caller of the mutation.
    #[error("Job list corrupted: {0}")]
    Corruption(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// Caller misused an operation (unsupported placement, duplicate job, ...)
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Scheduler or slot bookkeeping reached a state it cannot handle
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
