//! # Step Failure Classification
//!
//! Decides how the workflow engine reacts to a failed step.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ StepFailure     │────▶│ ErrorClassifier │────▶│ Classification  │
//! │ + ErrorContext  │     │ Strategy        │     │ Result          │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Three outcomes matter to the engine:
//!
//! - transient failures (network, timeout, pool exhaustion, rate limits) are retried while
//!   the step has attempt budget left
//! - validation rejections may trigger a re-conversion with the rejection fed back as
//!   guidance, bounded by a separate re-conversion budget
//! - everything else is permanent: the step fails and its dependents are skipped

use super::step_executor::StepFailure;
use crate::errors::ProviderError;
use crate::models::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Context information for error classification
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub job_id: Uuid,
    pub step_id: StepId,
    /// Current attempt number (1-based)
    pub attempt_number: u32,
    /// Attempts allowed for the step
    pub max_attempts: u32,
}

/// Primary error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Will never succeed if retried
    Permanent,
    /// Network or availability problem; may succeed on retry
    Transient,
    /// Provider call or step execution exceeded its time budget
    Timeout,
    /// Provider asked the caller to back off
    RateLimit,
    /// Connection pool or similar resource exhausted
    ResourceExhaustion,
    /// Candidate produced but rejected by validation
    ValidationRejected,
}

impl ErrorCategory {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transient | Self::Timeout | Self::RateLimit | Self::ResourceExhaustion
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Permanent => write!(f, "Permanent"),
            Self::Transient => write!(f, "Transient"),
            Self::Timeout => write!(f, "Timeout"),
            Self::RateLimit => write!(f, "Rate Limit"),
            Self::ResourceExhaustion => write!(f, "Resource Exhaustion"),
            Self::ValidationRejected => write!(f, "Validation Rejected"),
        }
    }
}

/// Result of error classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub error_category: ErrorCategory,
    /// Whether the step should go back to `ready` after backoff
    pub is_retryable: bool,
    /// Server-requested delay, overriding exponential backoff
    pub retry_after: Option<Duration>,
    pub error_code: String,
    pub error_message: String,
    /// Whether this was the last attempt the step's budget allows
    pub is_final_attempt: bool,
}

/// Trait for error classification strategies
pub trait ErrorClassifier: Send + Sync {
    fn classify_error(&self, failure: &StepFailure, context: &ErrorContext)
        -> ErrorClassification;

    /// Get the classifier name for identification
    fn classifier_name(&self) -> &'static str;
}

/// Default classification used by the workflow engine
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardErrorClassifier;

impl StandardErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    fn category_of(failure: &StepFailure) -> (ErrorCategory, Option<Duration>) {
        match failure {
            StepFailure::Provider(err) => match err {
                ProviderError::Connection(_) | ProviderError::Unavailable(_) => {
                    (ErrorCategory::Transient, None)
                }
                ProviderError::Timeout(_) => (ErrorCategory::Timeout, None),
                ProviderError::ResourceExhausted(_) => (ErrorCategory::ResourceExhaustion, None),
                ProviderError::RateLimited { retry_after, .. } => {
                    (ErrorCategory::RateLimit, *retry_after)
                }
                ProviderError::InvalidInput(_)
                | ProviderError::Rejected(_)
                | ProviderError::Execution(_)
                | ProviderError::NotFound(_) => (ErrorCategory::Permanent, None),
            },
            StepFailure::ValidationRejected { .. } => (ErrorCategory::ValidationRejected, None),
            StepFailure::TimedOut(_) => (ErrorCategory::Timeout, None),
            StepFailure::Persistence(_) => (ErrorCategory::Transient, None),
            StepFailure::Panicked(_) | StepFailure::MissingInput { .. } => {
                (ErrorCategory::Permanent, None)
            }
        }
    }
}

impl ErrorClassifier for StandardErrorClassifier {
    fn classify_error(
        &self,
        failure: &StepFailure,
        context: &ErrorContext,
    ) -> ErrorClassification {
        let (category, retry_after) = Self::category_of(failure);
        let is_final_attempt = context.attempt_number >= context.max_attempts;

        ErrorClassification {
            error_category: category,
            is_retryable: category.is_transient() && !is_final_attempt,
            retry_after,
            error_code: failure.error_code().to_string(),
            error_message: failure.to_string(),
            is_final_attempt,
        }
    }

    fn classifier_name(&self) -> &'static str {
        "standard"
    }
}
