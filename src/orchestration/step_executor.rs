//! # Step Executor
//!
//! Executes one workflow step for one object.
//!
//! ## Overview
//!
//! Step kinds form a closed set, and each kind is bound to exactly one `StepHandler`
//! implementation. The executor picks the handler with an exhaustive match, so adding a
//! kind means adding a variant and a handler rather than registering one at runtime.
//!
//! ```text
//! fetch    ──→ DiscoveryProvider::get_definition + describe_shape
//! convert  ──→ HistoryStore::get_attempts → ConversionProvider::convert
//!              → ExecutionProvider::execute(scratch) → shape match → HistoryStore::append_attempt
//! validate ──→ ExecutionProvider::validate (pre-flight against the primary target)
//! execute  ──→ ExecutionProvider::execute(primary)
//! record   ──→ CheckpointStore::save_object_result
//! ```
//!
//! ## Conversion audit trail
//!
//! Every conversion invocation appends exactly one `ConversionAttempt` before it returns,
//! whatever the outcome. Invocations cut short by a timeout or a panic are logged by
//! `execute_with_timeout` as failed attempts with the detail `incomplete`, and so are
//! conversions that fail before the provider is called (missing fetch output, unreadable
//! history), with the failure as detail.

use crate::errors::ProviderError;
use crate::models::{
    hash_definition, DatabaseObject, NewConversionAttempt, ObjectShape, QualifiedName, StepId,
    StepKind, WorkflowStep,
};
use crate::providers::{ConversionRequest, ExecutionTarget, ProviderRegistry};
use crate::state_machine::{CheckpointStore, ObjectMigrationRecord};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Payload produced by a successful step, carried forward to later phases of the same
/// object and persisted with the step's `succeeded` transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StepOutput {
    Fetched {
        definition: String,
        source_hash: String,
        shape: Option<ObjectShape>,
    },
    Converted {
        candidate: String,
        /// History sequence number of the accepted attempt
        attempt_sequence: u32,
    },
    Validated {
        candidate_hash: String,
    },
    Executed {
        shape: Option<ObjectShape>,
    },
    Recorded {
        final_hash: String,
        conversion_attempts: u32,
    },
}

impl StepOutput {
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Fetched { .. } => StepKind::Fetch,
            Self::Converted { .. } => StepKind::Convert,
            Self::Validated { .. } => StepKind::Validate,
            Self::Executed { .. } => StepKind::Execute,
            Self::Recorded { .. } => StepKind::Record,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

/// Typed failure of a single step invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Candidate rejected by validation: {}", .reasons.join("; "))]
    ValidationRejected { reasons: Vec<String> },

    #[error("Step timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Step handler panicked: {0}")]
    Panicked(String),

    #[error("Missing {kind} output for {object}")]
    MissingInput {
        object: QualifiedName,
        kind: StepKind,
    },

    #[error("Checkpoint write failed: {0}")]
    Persistence(String),
}

impl StepFailure {
    /// Short machine-readable code used in logs and transition reasons
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Provider(ProviderError::Connection(_)) => "provider_connection",
            Self::Provider(ProviderError::Timeout(_)) => "provider_timeout",
            Self::Provider(ProviderError::ResourceExhausted(_)) => "provider_resource_exhausted",
            Self::Provider(ProviderError::RateLimited { .. }) => "provider_rate_limited",
            Self::Provider(ProviderError::Unavailable(_)) => "provider_unavailable",
            Self::Provider(ProviderError::InvalidInput(_)) => "provider_invalid_input",
            Self::Provider(ProviderError::Rejected(_)) => "provider_rejected",
            Self::Provider(ProviderError::Execution(_)) => "provider_execution",
            Self::Provider(ProviderError::NotFound(_)) => "provider_not_found",
            Self::ValidationRejected { .. } => "validation_rejected",
            Self::TimedOut(_) => "step_timeout",
            Self::Panicked(_) => "handler_panic",
            Self::MissingInput { .. } => "missing_input",
            Self::Persistence(_) => "checkpoint_write_failed",
        }
    }
}

pub type StepResult = Result<StepOutput, StepFailure>;

/// Everything a handler needs to run one step.
///
/// Contexts are built by the workflow engine from its own job state and handed to a
/// worker by value; handlers never see or mutate the job itself.
#[derive(Clone)]
pub struct StepContext {
    pub job_id: Uuid,
    pub step_id: StepId,
    pub kind: StepKind,
    pub object: Arc<DatabaseObject>,
    /// Attempt counter of the step, 1-based
    pub attempt: u32,
    /// Number of prior conversion attempts handed to the conversion provider
    pub history_window: usize,
    /// Caller-supplied guidance for this object
    pub guidance: Option<String>,
    /// Rejection reason from the previous candidate, when re-converting
    pub feedback: Option<String>,
    /// Outputs of the object's earlier phases
    pub prior_outputs: BTreeMap<StepKind, StepOutput>,
    pub registry: ProviderRegistry,
    pub checkpoints: Arc<dyn CheckpointStore>,
    attempt_logged: Arc<AtomicBool>,
}

impl StepContext {
    pub fn new(
        job_id: Uuid,
        step: &WorkflowStep,
        object: Arc<DatabaseObject>,
        registry: ProviderRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            job_id,
            step_id: step.id.clone(),
            kind: step.kind,
            object,
            attempt: step.attempts,
            history_window: 5,
            guidance: None,
            feedback: None,
            prior_outputs: BTreeMap::new(),
            registry,
            checkpoints,
            attempt_logged: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_guidance(mut self, guidance: Option<String>) -> Self {
        self.guidance = guidance;
        self
    }

    pub fn with_feedback(mut self, feedback: Option<String>) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn with_prior_outputs(mut self, outputs: BTreeMap<StepKind, StepOutput>) -> Self {
        self.prior_outputs = outputs;
        self
    }

    pub fn object_name(&self) -> &QualifiedName {
        &self.object.name
    }

    /// Whether this invocation has already appended its conversion attempt
    pub fn attempt_logged(&self) -> bool {
        self.attempt_logged.load(Ordering::Acquire)
    }

    fn mark_attempt_logged(&self) {
        self.attempt_logged.store(true, Ordering::Release);
    }

    fn fetched(&self) -> Result<(&str, &str, Option<&ObjectShape>), StepFailure> {
        match self.prior_outputs.get(&StepKind::Fetch) {
            Some(StepOutput::Fetched {
                definition,
                source_hash,
                shape,
            }) => Ok((definition.as_str(), source_hash.as_str(), shape.as_ref())),
            _ => Err(self.missing(StepKind::Fetch)),
        }
    }

    fn candidate(&self) -> Result<&str, StepFailure> {
        match self.prior_outputs.get(&StepKind::Convert) {
            Some(StepOutput::Converted { candidate, .. }) => Ok(candidate.as_str()),
            _ => Err(self.missing(StepKind::Convert)),
        }
    }

    fn source_hash(&self) -> String {
        self.fetched()
            .map(|(_, hash, _)| hash.to_string())
            .unwrap_or_else(|_| self.object.definition_hash())
    }

    fn missing(&self, kind: StepKind) -> StepFailure {
        StepFailure::MissingInput {
            object: self.object.name.clone(),
            kind,
        }
    }

    /// Guidance sent to the conversion provider: caller guidance plus rejection feedback
    pub fn conversion_guidance(&self) -> Option<String> {
        match (&self.guidance, &self.feedback) {
            (Some(guidance), Some(feedback)) => Some(format!(
                "{guidance}\n\nThe previous candidate was rejected: {feedback}"
            )),
            (Some(guidance), None) => Some(guidance.clone()),
            (None, Some(feedback)) => {
                Some(format!("The previous candidate was rejected: {feedback}"))
            }
            (None, None) => None,
        }
    }
}

impl fmt::Debug for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepContext")
            .field("job_id", &self.job_id)
            .field("step_id", &self.step_id)
            .field("attempt", &self.attempt)
            .field("feedback", &self.feedback)
            .finish_non_exhaustive()
    }
}

/// One implementation per step kind
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn kind(&self) -> StepKind;

    async fn handle(&self, ctx: &StepContext) -> StepResult;
}

/// Retrieves the current source definition and, when available, its declared shape
#[derive(Debug, Default)]
pub struct FetchHandler;

#[async_trait]
impl StepHandler for FetchHandler {
    fn kind(&self) -> StepKind {
        StepKind::Fetch
    }

    async fn handle(&self, ctx: &StepContext) -> StepResult {
        let discovery = ctx.registry.discovery();
        let definition = discovery.get_definition(ctx.object_name()).await?;
        let shape = discovery.describe_shape(ctx.object_name()).await?;

        Ok(StepOutput::Fetched {
            source_hash: hash_definition(&definition),
            definition,
            shape,
        })
    }
}

/// Produces a candidate definition and validates it against the scratch target
#[derive(Debug, Default)]
pub struct ConvertHandler;

impl ConvertHandler {
    async fn log_attempt(
        &self,
        ctx: &StepContext,
        attempt: NewConversionAttempt,
    ) -> Result<u32, StepFailure> {
        let stored = ctx
            .registry
            .history()
            .append_attempt(attempt.for_step(ctx.job_id, ctx.attempt))
            .await?;
        ctx.mark_attempt_logged();
        Ok(stored.sequence)
    }

    async fn reject(
        &self,
        ctx: &StepContext,
        source_hash: &str,
        candidate: String,
        reasons: Vec<String>,
    ) -> StepResult {
        let detail = reasons.join("; ");
        self.log_attempt(
            ctx,
            NewConversionAttempt::failure(
                ctx.object_name().clone(),
                source_hash,
                Some(candidate),
                detail,
            ),
        )
        .await?;
        Err(StepFailure::ValidationRejected { reasons })
    }
}

#[async_trait]
impl StepHandler for ConvertHandler {
    fn kind(&self) -> StepKind {
        StepKind::Convert
    }

    async fn handle(&self, ctx: &StepContext) -> StepResult {
        let (source_definition, source_hash, source_shape) = ctx.fetched()?;
        let object = ctx.object_name();

        let history = ctx
            .registry
            .history()
            .get_attempts(object, ctx.history_window)
            .await?;

        let request = ConversionRequest {
            object: object.clone(),
            kind: ctx.object.kind,
            source_definition: source_definition.to_string(),
            history,
            guidance: ctx.conversion_guidance(),
        };

        let candidate = match ctx.registry.conversion().convert(&request).await {
            Ok(candidate) => candidate,
            Err(err) => {
                self.log_attempt(
                    ctx,
                    NewConversionAttempt::failure(
                        object.clone(),
                        source_hash,
                        None,
                        err.to_string(),
                    ),
                )
                .await?;
                return Err(err.into());
            }
        };

        let outcome = match ctx
            .registry
            .execution()
            .execute(object, &candidate, ExecutionTarget::Scratch)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_transient() => {
                self.log_attempt(
                    ctx,
                    NewConversionAttempt::failure(
                        object.clone(),
                        source_hash,
                        Some(candidate),
                        format!("scratch validation interrupted: {err}"),
                    ),
                )
                .await?;
                return Err(err.into());
            }
            Err(err) => {
                return self
                    .reject(
                        ctx,
                        source_hash,
                        candidate,
                        vec![format!("scratch execution failed: {err}")],
                    )
                    .await;
            }
        };

        if let (Some(expected), Some(actual)) = (source_shape, outcome.shape.as_ref()) {
            let mismatches = expected.mismatches(actual);
            if !mismatches.is_empty() {
                return self.reject(ctx, source_hash, candidate, mismatches).await;
            }
        }

        let sequence = self
            .log_attempt(
                ctx,
                NewConversionAttempt::success(object.clone(), source_hash, candidate.clone()),
            )
            .await?;

        Ok(StepOutput::Converted {
            candidate,
            attempt_sequence: sequence,
        })
    }
}

/// Pre-flight check of the accepted candidate against the primary target
#[derive(Debug, Default)]
pub struct ValidateHandler;

#[async_trait]
impl StepHandler for ValidateHandler {
    fn kind(&self) -> StepKind {
        StepKind::Validate
    }

    async fn handle(&self, ctx: &StepContext) -> StepResult {
        let candidate = ctx.candidate()?;
        ctx.registry
            .execution()
            .validate(ctx.object_name(), candidate)
            .await?;
        Ok(StepOutput::Validated {
            candidate_hash: hash_definition(candidate),
        })
    }
}

/// Applies the accepted candidate to the primary target
#[derive(Debug, Default)]
pub struct ExecuteHandler;

#[async_trait]
impl StepHandler for ExecuteHandler {
    fn kind(&self) -> StepKind {
        StepKind::Execute
    }

    async fn handle(&self, ctx: &StepContext) -> StepResult {
        let candidate = ctx.candidate()?;
        let outcome = ctx
            .registry
            .execution()
            .execute(ctx.object_name(), candidate, ExecutionTarget::Primary)
            .await?;
        Ok(StepOutput::Executed {
            shape: outcome.shape,
        })
    }
}

/// Persists the object's final migration result
#[derive(Debug, Default)]
pub struct RecordHandler;

#[async_trait]
impl StepHandler for RecordHandler {
    fn kind(&self) -> StepKind {
        StepKind::Record
    }

    async fn handle(&self, ctx: &StepContext) -> StepResult {
        let candidate = ctx.candidate()?;
        let object = ctx.object_name();

        let conversion_attempts = ctx
            .registry
            .history()
            .get_attempts(object, usize::MAX)
            .await?
            .iter()
            .filter(|attempt| attempt.job_id == Some(ctx.job_id))
            .count();
        let conversion_attempts = u32::try_from(conversion_attempts).unwrap_or(u32::MAX);

        let record = ObjectMigrationRecord {
            job_id: ctx.job_id,
            object: object.clone(),
            source_hash: ctx.source_hash(),
            final_definition: candidate.to_string(),
            conversion_attempts,
            recorded_at: Utc::now(),
        };
        ctx.checkpoints
            .save_object_result(&record)
            .await
            .map_err(|e| StepFailure::Persistence(e.to_string()))?;

        Ok(StepOutput::Recorded {
            final_hash: hash_definition(candidate),
            conversion_attempts,
        })
    }
}

/// Dispatches a step to the handler bound to its kind
#[derive(Debug, Default)]
pub struct StepExecutor {
    fetch: FetchHandler,
    convert: ConvertHandler,
    validate: ValidateHandler,
    execute: ExecuteHandler,
    record: RecordHandler,
}

impl StepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, kind: StepKind) -> &dyn StepHandler {
        match kind {
            StepKind::Fetch => &self.fetch,
            StepKind::Convert => &self.convert,
            StepKind::Validate => &self.validate,
            StepKind::Execute => &self.execute,
            StepKind::Record => &self.record,
        }
    }

    pub async fn execute(&self, ctx: &StepContext) -> StepResult {
        self.handler(ctx.kind).handle(ctx).await
    }

    /// Execute a step with a timeout and panic catching.
    ///
    /// A conversion that returns without having logged its attempt gets a failure record
    /// here: `incomplete` when it was cut short, the failure itself otherwise.
    pub async fn execute_with_timeout(&self, ctx: &StepContext, timeout: Duration) -> StepResult {
        let start_time = Instant::now();
        let execution_result =
            tokio::time::timeout(timeout, AssertUnwindSafe(self.execute(ctx)).catch_unwind())
                .await;
        let execution_time_ms = start_time.elapsed().as_millis();

        let result = match execution_result {
            Ok(Ok(result)) => {
                debug!(
                    job_id = %ctx.job_id,
                    step_id = %ctx.step_id,
                    success = result.is_ok(),
                    execution_time_ms = execution_time_ms,
                    "Step handler completed"
                );
                result
            }
            Ok(Err(panic_error)) => {
                let panic_msg = if let Some(s) = panic_error.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_error.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                error!(
                    job_id = %ctx.job_id,
                    step_id = %ctx.step_id,
                    panic_msg = %panic_msg,
                    execution_time_ms = execution_time_ms,
                    "Step handler panicked"
                );
                Err(StepFailure::Panicked(panic_msg))
            }
            Err(_) => {
                warn!(
                    job_id = %ctx.job_id,
                    step_id = %ctx.step_id,
                    timeout_ms = timeout.as_millis(),
                    "Step handler timed out"
                );
                Err(StepFailure::TimedOut(timeout))
            }
        };

        if ctx.kind.is_conversion() && !ctx.attempt_logged() {
            match &result {
                Err(StepFailure::TimedOut(_) | StepFailure::Panicked(_)) => {
                    self.log_incomplete_attempt(ctx).await?;
                }
                Err(failure) => self.log_failed_attempt(ctx, failure).await?,
                Ok(_) => {}
            }
        }
        result
    }

    /// Append a failure record for a conversion that failed before reaching the provider
    async fn log_failed_attempt(
        &self,
        ctx: &StepContext,
        failure: &StepFailure,
    ) -> Result<(), StepFailure> {
        ctx.registry
            .history()
            .append_attempt(
                NewConversionAttempt::failure(
                    ctx.object_name().clone(),
                    ctx.source_hash(),
                    None,
                    failure.to_string(),
                )
                .for_step(ctx.job_id, ctx.attempt),
            )
            .await?;
        ctx.mark_attempt_logged();
        Ok(())
    }

    /// Append an `incomplete` failure record for an interrupted conversion
    pub async fn log_incomplete_attempt(&self, ctx: &StepContext) -> Result<(), StepFailure> {
        ctx.registry
            .history()
            .append_attempt(
                NewConversionAttempt::incomplete(ctx.object_name().clone(), ctx.source_hash())
                    .for_step(ctx.job_id, ctx.attempt),
            )
            .await?;
        ctx.mark_attempt_logged();
        Ok(())
    }
}
