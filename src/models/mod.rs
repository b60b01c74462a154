//! # Models
//!
//! Domain data types for schema migration jobs.
//!
//! ## Overview
//!
//! - [`database_object`] - discovered schema objects, names, kinds and shapes
//! - [`conversion_attempt`] - append-only conversion audit records
//! - [`workflow_step`] - one phase of one object's migration chain
//! - [`job`] - migration jobs and status reports

pub mod conversion_attempt;
pub mod database_object;
pub mod job;
pub mod workflow_step;

pub use conversion_attempt::{
    AttemptOutcome, ConversionAttempt, NewConversionAttempt, INCOMPLETE_ATTEMPT_DETAIL,
};
pub use database_object::{
    hash_definition, ColumnShape, Complexity, DatabaseObject, ObjectKind, ObjectShape,
    QualifiedName,
};
pub use job::{Job, JobOptions, JobStatus, ObjectProgress, ObjectSelector, StepCounts};
pub use workflow_step::{StepId, StepKind, WorkflowStep};
