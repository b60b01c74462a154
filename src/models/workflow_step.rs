//! # Workflow Step Model
//!
//! One phase of one object's migration chain.
//!
//! ## Overview
//!
//! Every executable object gets a chain of five steps in standard phase order:
//! `fetch -> convert -> validate -> execute -> record`. Each step names the operation it
//! is bound to, lists the steps that must succeed before it may run, and tracks its own
//! status and attempt counters. Steps are owned by their `Job` and never outlive it.

use super::QualifiedName;
use crate::state_machine::StepState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable step identifier: `<schema>.<name>::<phase>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn for_phase(object: &QualifiedName, kind: StepKind) -> Self {
        Self(format!("{object}::{kind}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Closed set of step kinds; adding a kind means adding a variant and a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Fetch,
    Convert,
    Validate,
    Execute,
    Record,
}

impl StepKind {
    /// Standard phase order for a single object's chain
    pub const PHASES: [StepKind; 5] = [
        StepKind::Fetch,
        StepKind::Convert,
        StepKind::Validate,
        StepKind::Execute,
        StepKind::Record,
    ];

    /// Name of the operation this step kind is bound to
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch_definition",
            Self::Convert => "convert_definition",
            Self::Validate => "validate_candidate",
            Self::Execute => "execute_candidate",
            Self::Record => "record_result",
        }
    }

    /// Position within the phase chain
    pub fn phase_index(&self) -> usize {
        match self {
            Self::Fetch => 0,
            Self::Convert => 1,
            Self::Validate => 2,
            Self::Execute => 3,
            Self::Record => 4,
        }
    }

    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Convert)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Convert => write!(f, "convert"),
            Self::Validate => write!(f, "validate"),
            Self::Execute => write!(f, "execute"),
            Self::Record => write!(f, "record"),
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(Self::Fetch),
            "convert" => Ok(Self::Convert),
            "validate" => Ok(Self::Validate),
            "execute" => Ok(Self::Execute),
            "record" => Ok(Self::Record),
            _ => Err(format!("Invalid step kind: {s}")),
        }
    }
}

/// A single schedulable step within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub label: String,
    pub kind: StepKind,
    /// Bound operation name
    pub operation: String,
    pub object: QualifiedName,
    /// Input parameters handed to the operation
    #[serde(default)]
    pub params: serde_json::Value,
    /// Steps that must be `succeeded` before this one becomes ready
    pub prerequisites: Vec<StepId>,
    pub status: StepState,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Re-conversions requested after validation rejections
    pub reconversions: u32,
    /// Dispatch priority: position of the object in topological order
    pub order: usize,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn new(
        object: QualifiedName,
        kind: StepKind,
        prerequisites: Vec<StepId>,
        order: usize,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: StepId::for_phase(&object, kind),
            label: format!("{kind} {object}"),
            kind,
            operation: kind.operation_name().to_string(),
            params: serde_json::json!({ "object": object.to_string() }),
            object,
            prerequisites,
            status: StepState::Pending,
            attempts: 0,
            max_attempts,
            reconversions: 0,
            order,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Attempts allowed so far; each re-conversion after a validation rejection grants one
    /// attempt on top of the transient retry budget
    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.saturating_add(self.reconversions)
    }

    pub fn has_retry_budget(&self) -> bool {
        self.attempts < self.attempt_limit()
    }

    /// Sort key for dispatch: topological position first, then phase
    pub fn dispatch_key(&self) -> (usize, usize) {
        (self.order, self.kind.phase_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_identity_and_binding() {
        let object = QualifiedName::new("sales", "orders");
        let step = WorkflowStep::new(object.clone(), StepKind::Convert, vec![], 3, 3);

        assert_eq!(step.id.as_str(), "sales.orders::convert");
        assert_eq!(step.operation, "convert_definition");
        assert_eq!(step.status, StepState::Pending);
        assert_eq!(step.dispatch_key(), (3, 1));
        assert!(step.has_retry_budget());
    }

    #[test]
    fn test_reconversions_extend_attempt_limit() {
        let mut step =
            WorkflowStep::new(QualifiedName::new("s", "t"), StepKind::Convert, vec![], 0, 1);
        step.attempts = 1;
        assert!(!step.has_retry_budget());

        step.reconversions = 1;
        assert_eq!(step.attempt_limit(), 2);
        assert!(step.has_retry_budget());
    }

    #[test]
    fn test_phase_order() {
        let indices: Vec<usize> = StepKind::PHASES.iter().map(StepKind::phase_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!("validate".parse::<StepKind>().unwrap(), StepKind::Validate);
    }
}
