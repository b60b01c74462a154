//! # Conversion Attempt Model
//!
//! Append-only audit records of every try at converting an object's definition.
//!
//! Records are owned by the history store. The store assigns the per-object sequence
//! number at append time, so callers build a `NewConversionAttempt` and never mutate a
//! stored `ConversionAttempt`.

use super::QualifiedName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Failure detail recorded for attempts interrupted before they could report an outcome
pub const INCOMPLETE_ATTEMPT_DETAIL: &str = "incomplete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// A stored conversion attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionAttempt {
    pub object: QualifiedName,
    /// 1-based sequence number per object, assigned by the history store
    pub sequence: u32,
    pub job_id: Option<Uuid>,
    /// Attempt counter of the workflow step that produced this record
    pub step_attempt: u32,
    pub source_hash: String,
    pub resulting_definition: Option<String>,
    pub outcome: AttemptOutcome,
    pub failure_detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ConversionAttempt {
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// A conversion attempt before the history store has assigned its sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversionAttempt {
    pub object: QualifiedName,
    pub job_id: Option<Uuid>,
    pub step_attempt: u32,
    pub source_hash: String,
    pub resulting_definition: Option<String>,
    pub outcome: AttemptOutcome,
    pub failure_detail: Option<String>,
}

impl NewConversionAttempt {
    pub fn success(
        object: QualifiedName,
        source_hash: impl Into<String>,
        resulting_definition: impl Into<String>,
    ) -> Self {
        Self {
            object,
            job_id: None,
            step_attempt: 0,
            source_hash: source_hash.into(),
            resulting_definition: Some(resulting_definition.into()),
            outcome: AttemptOutcome::Success,
            failure_detail: None,
        }
    }

    pub fn failure(
        object: QualifiedName,
        source_hash: impl Into<String>,
        resulting_definition: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            object,
            job_id: None,
            step_attempt: 0,
            source_hash: source_hash.into(),
            resulting_definition,
            outcome: AttemptOutcome::Failure,
            failure_detail: Some(detail.into()),
        }
    }

    /// Failure record for an attempt that never reported back
    pub fn incomplete(object: QualifiedName, source_hash: impl Into<String>) -> Self {
        Self::failure(object, source_hash, None, INCOMPLETE_ATTEMPT_DETAIL)
    }

    pub fn for_step(mut self, job_id: Uuid, step_attempt: u32) -> Self {
        self.job_id = Some(job_id);
        self.step_attempt = step_attempt;
        self
    }

    /// Finalize into a stored record with the given sequence number
    pub fn into_attempt(self, sequence: u32, recorded_at: DateTime<Utc>) -> ConversionAttempt {
        ConversionAttempt {
            object: self.object,
            sequence,
            job_id: self.job_id,
            step_attempt: self.step_attempt,
            source_hash: self.source_hash,
            resulting_definition: self.resulting_definition,
            outcome: self.outcome,
            failure_detail: self.failure_detail,
            recorded_at,
        }
    }
}
