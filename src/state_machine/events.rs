use serde::{Deserialize, Serialize};

/// Events that can trigger job state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// Begin dispatching steps
    Start,
    Pause,
    Resume,
    /// Every step succeeded
    Complete,
    /// Finished with at least one failed or skipped object
    Fail(String),
    Cancel,
}

impl JobEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Events that can trigger workflow step state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// All prerequisites succeeded
    Promote,
    /// Dispatched to a worker
    Start,
    Succeed,
    /// Attempt failed with the given reason
    Fail(String),
    /// Retry budget remains; return to ready
    Retry,
    /// Upstream step failed permanently
    Skip(String),
}

impl StepEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Promote => "promote",
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Retry => "retry",
            Self::Skip(_) => "skip",
        }
    }

    /// Reason attached to failure and skip events
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) | Self::Skip(msg) => Some(msg),
            _ => None,
        }
    }
}

impl StepEvent {
    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
