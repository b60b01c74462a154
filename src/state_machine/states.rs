use serde::{Deserialize, Serialize};
use std::fmt;

/// Migration job state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job has been planned but not started
    Created,
    /// Coordinator is dispatching steps
    Running,
    /// Dispatching suspended; in-flight steps are allowed to finish
    Paused,
    /// Every step succeeded
    Completed,
    /// At least one object never reached succeeded
    Failed,
    /// Cancelled cooperatively by the caller
    Cancelled,
}

impl JobState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid job state: {s}")),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::Created
    }
}

/// Workflow step state definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting on prerequisites
    Pending,
    /// All prerequisites succeeded; eligible for dispatch
    Ready,
    /// Dispatched to a worker
    Running,
    Succeeded,
    /// Failed; terminal unless a retry moves it back to ready
    Failed,
    /// Not run because an upstream step failed permanently
    Skipped,
}

impl StepState {
    /// Check if this is a terminal state once retries are exhausted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    /// Check if this step satisfies dependencies for other steps
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Check if this step blocks its dependents permanently
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}
