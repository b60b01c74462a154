//! Error types for the migration orchestration core.
//!

use crate::config::ConfigurationError;
use crate::models::QualifiedName;
use crate::state_machine::errors::{PersistenceError, StateMachineError};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Structural errors raised while building or ordering a dependency graph.
///
/// These are reported immediately to the caller; a job never starts when one of
/// them is returned from graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Object {name} already exists and replacement is disallowed")]
    DuplicateObject { name: QualifiedName },

    #[error("Unknown object {name} referenced by dependency {dependent} -> {dependency}")]
    UnknownObject {
        name: QualifiedName,
        dependent: QualifiedName,
        dependency: QualifiedName,
    },

    #[error("Object {name} cannot depend on itself")]
    SelfDependency { name: QualifiedName },

    #[error("Cyclic dependency detected: {}", format_cycles(.cycles))]
    CyclicDependency { cycles: Vec<Vec<QualifiedName>> },
}

impl GraphError {
    /// Cycles carried by a `CyclicDependency` error, empty for any other variant
    pub fn cycles(&self) -> &[Vec<QualifiedName>] {
        match self {
            Self::CyclicDependency { cycles } => cycles,
            _ => &[],
        }
    }
}

fn format_cycles(cycles: &[Vec<QualifiedName>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            cycle
                .iter()
                .map(QualifiedName::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors surfaced by external collaborators (discovery, conversion, execution, history).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rejected by provider: {0}")]
    Rejected(String),

    #[error("Statement execution failed: {0}")]
    Execution(String),

    #[error("Object not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    /// Network, timeout and pool exhaustion errors may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::Timeout(_)
                | Self::ResourceExhausted(_)
                | Self::RateLimited { .. }
                | Self::Unavailable(_)
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors raised by the job coordinator and workflow engine.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Job {job_id} not found")]
    JobNotFound { job_id: Uuid },

    #[error("Job {job_id} is in state {current_state}, expected one of {expected_states:?}")]
    InvalidJobState {
        job_id: Uuid,
        current_state: String,
        expected_states: Vec<String>,
    },

    #[error("Step {step_id} not found in job {job_id}")]
    StepNotFound { job_id: Uuid, step_id: String },

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(#[source] ProviderError),

    #[error("Conversion history unavailable: {0}")]
    History(#[source] ProviderError),

    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Checkpoint persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Coordinator channel closed for job {job_id}")]
    ChannelClosed { job_id: Uuid },

    #[error("Job selection is empty: {reason}")]
    EmptySelection { reason: String },
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

/// Umbrella error for callers that work across every subsystem
#[derive(Debug, Error)]
pub enum DbRefactorError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbRefactorResult<T> = Result<T, DbRefactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_message_lists_every_cycle() {
        let err = GraphError::CyclicDependency {
            cycles: vec![
                vec!["s.a".parse().unwrap(), "s.b".parse().unwrap(), "s.a".parse().unwrap()],
                vec!["s.c".parse().unwrap(), "s.d".parse().unwrap(), "s.c".parse().unwrap()],
            ],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic dependency detected: s.a -> s.b -> s.a; s.c -> s.d -> s.c"
        );
        assert_eq!(err.cycles().len(), 2);
    }

    #[test]
    fn test_provider_error_transience() {
        assert!(ProviderError::Connection("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::ResourceExhausted("pool".into()).is_transient());
        assert!(!ProviderError::InvalidInput("bad ddl".into()).is_transient());
        assert!(!ProviderError::Execution("syntax".into()).is_transient());
    }
}
