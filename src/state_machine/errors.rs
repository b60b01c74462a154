use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard condition failed: {reason}")]
    GuardFailed { reason: String },

    #[error("Persistence operation failed: {reason}")]
    PersistenceFailed { reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error type for checkpoint persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to save transition: {reason}")]
    TransitionSaveFailed { reason: String },

    #[error("Job record not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("Invalid persisted data in {field}: {reason}")]
    InvalidData { field: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PersistenceError> for StateMachineError {
    fn from(err: PersistenceError) -> Self {
        Self::PersistenceFailed {
            reason: err.to_string(),
        }
    }
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Helper function to create invalid-transition errors
pub fn invalid_transition(from: impl ToString, event: impl Into<String>) -> StateMachineError {
    StateMachineError::InvalidTransition {
        from: from.to_string(),
        event: event.into(),
    }
}

/// Helper function to create guard failures
pub fn guard_failed(reason: impl Into<String>) -> StateMachineError {
    StateMachineError::GuardFailed {
        reason: reason.into(),
    }
}
