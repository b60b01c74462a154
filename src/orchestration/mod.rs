//! # Orchestration
//!
//! Scheduling and execution of migration jobs.
//!
//! ## Core Components
//!
//! - **JobCoordinator**: starts, controls and reports on jobs; one engine task per live job
//! - **JobPlanner**: turns a dependency graph into a job's phase chains
//! - **WorkflowEngine**: wave scheduler with a bounded worker pool and a completion channel
//! - **StepExecutor**: dispatches a step to the handler for its kind, with timeout and panic capture
//! - **ErrorClassifier**: decides whether a step failure is retried, re-converted or final
//! - **BackoffCalculator**: delay before a failed step returns to `ready`
//! - **EventPublisher**: broadcast of job and step transitions
//!
//! ## Phase Chain
//!
//! Every executable object runs the same five phases in order:
//!
//! ```text
//! fetch → convert → validate → execute → record
//! ```
//!
//! `convert` produces a candidate and proves it against a scratch target; `validate`
//! pre-flights the accepted candidate against the real target; `execute` applies it;
//! `record` stores the per-object result.

pub mod backoff;
pub mod coordinator;
pub mod error_classifier;
pub mod event_publisher;
pub mod job_planner;
pub mod step_executor;
pub mod workflow_engine;

pub use backoff::BackoffCalculator;
pub use coordinator::{EngineStats, JobCoordinator};
pub use error_classifier::{
    ErrorCategory, ErrorClassification, ErrorClassifier, ErrorContext, StandardErrorClassifier,
};
pub use event_publisher::{
    EventPublisher, JobTransitionEvent, OrchestrationEvent, StepTransitionEvent,
};
pub use job_planner::{JobPlanner, PlannerDefaults};
pub use step_executor::{
    ConvertHandler, ExecuteHandler, FetchHandler, RecordHandler, StepContext, StepExecutor,
    StepFailure, StepHandler, StepOutput, StepResult, ValidateHandler,
};
pub use workflow_engine::{
    EngineCommand, EngineHandle, EngineServices, EngineSettings, WorkflowEngine,
};
