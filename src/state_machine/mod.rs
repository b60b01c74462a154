//! # State Machines
//!
//! Job and workflow step lifecycles as explicit transition tables, plus the checkpoint
//! store that records every applied transition.

pub mod errors;
pub mod events;
pub mod job_state_machine;
pub mod persistence;
pub mod states;
pub mod step_state_machine;

pub use errors::{PersistenceError, PersistenceResult, StateMachineError, StateMachineResult};
pub use events::{JobEvent, StepEvent};
pub use job_state_machine::JobStateMachine;
pub use persistence::{
    CheckpointStore, InMemoryCheckpointStore, JobRecord, JobSummary, JobTransitionRecord,
    ObjectMigrationRecord, PersistedJob, StepTransitionRecord,
};
#[cfg(feature = "postgres")]
pub use persistence::PgCheckpointStore;
pub use states::{JobState, StepState};
pub use step_state_machine::{AppliedTransition, StepStateMachine};
