//! # Workflow Engine
//!
//! Wave scheduler that drives one job's steps to completion.
//!
//! ## Overview
//!
//! The engine is the single writer of its job. Each loop iteration it:
//!
//! 1. skips pending steps whose prerequisites can no longer succeed
//! 2. promotes pending steps whose prerequisites have all succeeded
//! 3. dispatches ready steps to spawned workers, up to the concurrency limit
//! 4. waits for a worker completion, a control command, or the next retry deadline
//!
//! Workers never touch the job. They receive a `StepContext` by value and report a
//! `StepResult` back through the completion channel, which the engine drains and applies.
//!
//! ```text
//!                  ┌──────────── completion channel ◀─────────────┐
//!                  ▼                                               │
//! commands ──▶ WorkflowEngine ──▶ tokio::spawn(execute_with_timeout) ──▶ providers
//!                  │
//!                  ├──▶ CheckpointStore (every transition)
//!                  ├──▶ EventPublisher  (every transition)
//!                  └──▶ watch::Sender<JobStatus>
//! ```
//!
//! ## Failure handling
//!
//! - transient failures: `running → failed`, then `failed → ready` after backoff
//! - validation rejections: re-conversion with the rejection fed back as guidance, while
//!   the re-conversion budget lasts
//! - permanent failures and exhausted budgets: the step stays `failed` and every step that
//!   transitively depends on it is skipped; independent branches keep running
//!
//! ## Control
//!
//! Pause stops dispatching while in-flight steps finish. Cancel is cooperative: no new
//! step is dispatched, in-flight steps complete their current attempt, then the job moves
//! to `cancelled`.

use super::backoff::BackoffCalculator;
use super::error_classifier::{ErrorCategory, ErrorClassifier, ErrorContext};
use super::event_publisher::{
    EventPublisher, JobTransitionEvent, OrchestrationEvent, StepTransitionEvent,
};
use super::step_executor::{StepContext, StepExecutor, StepFailure, StepOutput, StepResult};
use crate::config::MigrationConfig;
use crate::errors::{OrchestrationError, OrchestrationResult};
use crate::models::{Job, JobOptions, JobStatus, NewConversionAttempt, StepId, StepKind};
use crate::providers::ProviderRegistry;
use crate::state_machine::{
    CheckpointStore, JobEvent, JobState, JobStateMachine, JobTransitionRecord, PersistedJob,
    StepEvent, StepState, StepStateMachine, StepTransitionRecord,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 16;

/// Control requests sent to a running engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Pause,
    Resume,
    Cancel,
}

/// Per-job execution limits resolved from configuration and job options
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub max_concurrency: usize,
    pub history_window: usize,
    pub reconversion_budget: u32,
    pub step_timeout: Duration,
    pub backoff: BackoffCalculator,
}

impl EngineSettings {
    pub fn resolve(config: &MigrationConfig, options: &JobOptions) -> Self {
        Self {
            max_concurrency: options
                .max_concurrency
                .unwrap_or(config.execution.max_concurrency)
                .max(1),
            history_window: config.execution.history_window,
            reconversion_budget: options
                .reconversion_budget
                .unwrap_or(config.execution.reconversion_budget),
            step_timeout: config.execution.step_timeout(),
            backoff: BackoffCalculator::new(&config.backoff),
        }
    }
}

/// Collaborators shared by every engine a coordinator runs
#[derive(Clone)]
pub struct EngineServices {
    pub registry: ProviderRegistry,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub executor: Arc<StepExecutor>,
    pub classifier: Arc<dyn ErrorClassifier>,
    pub events: EventPublisher,
}

impl fmt::Debug for EngineServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineServices")
            .field("registry", &self.registry)
            .field("classifier", &self.classifier.classifier_name())
            .finish_non_exhaustive()
    }
}

/// Caller-side handle to a spawned engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    job_id: Uuid,
    commands: mpsc::Sender<EngineCommand>,
    status: watch::Receiver<JobStatus>,
}

impl EngineHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Latest status snapshot published by the engine
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Send a control command; fails once the engine has stopped
    pub async fn send(&self, command: EngineCommand) -> OrchestrationResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OrchestrationError::ChannelClosed {
                job_id: self.job_id,
            })
    }

    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Wait until the job reaches a terminal state or the engine stops
    pub async fn wait_for_terminal(&self) -> JobStatus {
        let mut status = self.status.clone();
        let result = status
            .wait_for(|s| s.state.is_terminal())
            .await
            .map(|snapshot| snapshot.clone());
        match result {
            Ok(snapshot) => snapshot,
            Err(_) => status.borrow().clone(),
        }
    }
}

#[derive(Debug)]
struct StepCompletion {
    step_id: StepId,
    result: StepResult,
}

pub struct WorkflowEngine {
    job: Job,
    settings: EngineSettings,
    services: EngineServices,
    commands: mpsc::Receiver<EngineCommand>,
    commands_open: bool,
    status: watch::Sender<JobStatus>,
    outputs: HashMap<StepId, StepOutput>,
    /// Rejection feedback for steps about to re-convert
    feedback: HashMap<StepId, String>,
    /// Failed steps waiting for their backoff to elapse
    retry_at: HashMap<StepId, Instant>,
    /// Steps found `running` in a restored checkpoint
    interrupted: Vec<StepId>,
    in_flight: usize,
    cancel_requested: bool,
}

impl WorkflowEngine {
    pub fn new(
        job: Job,
        settings: EngineSettings,
        services: EngineServices,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(job.status());
        let handle = EngineHandle {
            job_id: job.id,
            commands: command_tx,
            status: status_rx,
        };

        let engine = Self {
            job,
            settings,
            services,
            commands: command_rx,
            commands_open: true,
            status: status_tx,
            outputs: HashMap::new(),
            feedback: HashMap::new(),
            retry_at: HashMap::new(),
            interrupted: Vec::new(),
            in_flight: 0,
            cancel_requested: false,
        };
        (engine, handle)
    }

    /// Rebuild an engine from its last durable checkpoint.
    ///
    /// Succeeded steps keep their persisted outputs and are never re-run. Steps that were
    /// `running` when the checkpoint was written are treated as interrupted attempts;
    /// failed steps that were waiting for a retry are retried immediately, and pending
    /// re-conversions get their rejection feedback back.
    pub fn restore(
        persisted: &PersistedJob,
        settings: EngineSettings,
        services: EngineServices,
    ) -> (Self, EngineHandle) {
        let job = persisted.restore_job();
        let latest = persisted.latest_step_transitions();

        let outputs: HashMap<StepId, StepOutput> = persisted
            .latest_outputs()
            .into_iter()
            .filter(|(id, _)| {
                job.step(id)
                    .is_some_and(|step| step.status == StepState::Succeeded)
            })
            .filter_map(|(id, value)| StepOutput::from_value(value).map(|o| (id.clone(), o)))
            .collect();

        let now = Instant::now();
        let retry_at: HashMap<StepId, Instant> = job
            .steps
            .iter()
            .filter(|step| step.status == StepState::Failed && step.has_retry_budget())
            .filter(|step| latest.get(&step.id).is_some_and(|t| t.retryable))
            .map(|step| (step.id.clone(), now))
            .collect();

        let interrupted: Vec<StepId> = job
            .steps
            .iter()
            .filter(|step| step.status == StepState::Running)
            .map(|step| step.id.clone())
            .collect();

        let feedback: HashMap<StepId, String> = persisted
            .reconversion_feedback()
            .into_iter()
            .map(|(id, reason)| (id.clone(), reason.to_string()))
            .collect();

        let (mut engine, handle) = Self::new(job, settings, services);
        engine.outputs = outputs;
        engine.feedback = feedback;
        engine.retry_at = retry_at;
        engine.interrupted = interrupted;
        (engine, handle)
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Drive the job until it completes, fails, is cancelled, or its controller goes away
    /// while it is paused
    #[instrument(skip(self), fields(job_id = %self.job.id))]
    pub async fn run(mut self) -> OrchestrationResult<JobStatus> {
        match self.drive().await {
            Ok(()) => Ok(self.job.status()),
            Err(err) => {
                crate::log_job!(
                    error,
                    "job_engine_failed",
                    job_id: self.job.id,
                    error: err.to_string(),
                );
                self.job.error = Some(err.to_string());
                self.publish_status();
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> OrchestrationResult<()> {
        if self.job.state.is_terminal() {
            return Ok(());
        }

        let (result_tx, mut result_rx) =
            mpsc::channel::<StepCompletion>(self.settings.max_concurrency);

        self.recover_interrupted().await?;
        if self.job.state == JobState::Created {
            self.transition_job(JobEvent::Start).await?;
        }

        loop {
            if self.dispatching() {
                self.skip_blocked_steps().await?;
                self.promote_ready_steps().await?;
                self.dispatch_ready_steps(&result_tx).await?;
            }

            if self.in_flight == 0 {
                if self.cancel_requested {
                    self.finish_cancel().await?;
                    return Ok(());
                }
                if self.job.state == JobState::Running
                    && self.retry_at.is_empty()
                    && !self.has_ready_steps()
                {
                    self.finalize().await?;
                    return Ok(());
                }
                if self.job.state == JobState::Paused && !self.commands_open {
                    warn!(
                        job_id = %self.job.id,
                        "Controller went away while job is paused; stopping engine"
                    );
                    return Ok(());
                }
            }

            let next_retry = self.retry_at.values().min().copied();
            tokio::select! {
                Some(completion) = result_rx.recv(), if self.in_flight > 0 => {
                    self.in_flight -= 1;
                    self.handle_completion(completion).await?;
                }
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command).await?,
                    None => self.commands_open = false,
                },
                _ = tokio::time::sleep_until(next_retry.unwrap_or_else(Instant::now)), if next_retry.is_some() => {
                    self.release_due_retries().await?;
                }
                else => {
                    return Err(OrchestrationError::ChannelClosed { job_id: self.job.id });
                }
            }
        }
    }

    fn dispatching(&self) -> bool {
        self.job.state == JobState::Running && !self.cancel_requested
    }

    fn has_ready_steps(&self) -> bool {
        self.job.steps.iter().any(|s| s.status == StepState::Ready)
    }

    fn step_not_found(&self, id: &StepId) -> OrchestrationError {
        OrchestrationError::StepNotFound {
            job_id: self.job.id,
            step_id: id.to_string(),
        }
    }

    /// Log the missing attempt of every interrupted conversion, then fail or retry the step
    async fn recover_interrupted(&mut self) -> OrchestrationResult<()> {
        for id in std::mem::take(&mut self.interrupted) {
            let step = self.job.step(&id).ok_or_else(|| self.step_not_found(&id))?;
            let retryable = step.has_retry_budget();

            if step.kind.is_conversion() {
                self.ensure_attempt_logged(&id).await?;
            }

            crate::log_step!(
                warn,
                "step_interrupted",
                step_id: id,
                job_id: self.job.id,
                retryable: retryable,
            );
            self.transition_step(
                &id,
                StepEvent::Fail("interrupted before completion".to_string()),
                None,
                retryable,
            )
            .await?;
            if retryable {
                self.retry_at.insert(id, Instant::now());
            }
        }
        Ok(())
    }

    async fn ensure_attempt_logged(&self, id: &StepId) -> OrchestrationResult<()> {
        let step = self.job.step(id).ok_or_else(|| self.step_not_found(id))?;
        let history = self.services.registry.history();
        let logged = history
            .get_attempts(&step.object, usize::MAX)
            .await
            .map_err(OrchestrationError::History)?
            .iter()
            .any(|a| a.job_id == Some(self.job.id) && a.step_attempt == step.attempts);
        if logged {
            return Ok(());
        }

        let fetch_id = StepId::for_phase(&step.object, StepKind::Fetch);
        let source_hash = match self.outputs.get(&fetch_id) {
            Some(StepOutput::Fetched { source_hash, .. }) => source_hash.clone(),
            _ => self
                .job
                .object(&step.object)
                .map(|o| o.definition_hash())
                .unwrap_or_default(),
        };
        history
            .append_attempt(
                NewConversionAttempt::incomplete(step.object.clone(), source_hash)
                    .for_step(self.job.id, step.attempts),
            )
            .await
            .map_err(OrchestrationError::History)?;
        Ok(())
    }

    /// Skip every waiting step downstream of a step that can no longer succeed
    async fn skip_blocked_steps(&mut self) -> OrchestrationResult<()> {
        let mut seen = HashSet::new();
        let mut blocked: Vec<(StepId, StepId)> = Vec::new();
        for upstream in self
            .job
            .steps
            .iter()
            .filter(|s| self.is_permanently_blocked(&s.id))
        {
            for id in self.job.transitive_dependents(&upstream.id) {
                let waiting = self
                    .job
                    .step(&id)
                    .is_some_and(|s| matches!(s.status, StepState::Pending | StepState::Ready));
                if waiting && seen.insert(id.clone()) {
                    blocked.push((id, upstream.id.clone()));
                }
            }
        }

        for (id, upstream) in blocked {
            self.transition_step(
                &id,
                StepEvent::Skip(format!("upstream step {upstream} did not succeed")),
                None,
                false,
            )
            .await?;
        }
        Ok(())
    }

    fn is_permanently_blocked(&self, id: &StepId) -> bool {
        self.job.step(id).is_some_and(|step| match step.status {
            StepState::Skipped => true,
            StepState::Failed => !self.retry_at.contains_key(id),
            _ => false,
        })
    }

    async fn promote_ready_steps(&mut self) -> OrchestrationResult<()> {
        let promotable: Vec<StepId> = self
            .job
            .steps
            .iter()
            .filter(|s| s.status == StepState::Pending && self.job.prerequisites_met(s))
            .map(|s| s.id.clone())
            .collect();

        for id in promotable {
            self.transition_step(&id, StepEvent::Promote, None, false)
                .await?;
        }
        Ok(())
    }

    async fn dispatch_ready_steps(
        &mut self,
        results: &mpsc::Sender<StepCompletion>,
    ) -> OrchestrationResult<()> {
        let capacity = self.settings.max_concurrency.saturating_sub(self.in_flight);
        if capacity == 0 {
            return Ok(());
        }

        let mut ready: Vec<(usize, usize, StepId)> = self
            .job
            .steps
            .iter()
            .filter(|s| s.status == StepState::Ready)
            .map(|s| {
                let (order, phase) = s.dispatch_key();
                (order, phase, s.id.clone())
            })
            .collect();
        ready.sort();

        for (_, _, id) in ready.into_iter().take(capacity) {
            self.dispatch_step(&id, results).await?;
        }
        Ok(())
    }

    async fn dispatch_step(
        &mut self,
        id: &StepId,
        results: &mpsc::Sender<StepCompletion>,
    ) -> OrchestrationResult<()> {
        self.transition_step(id, StepEvent::Start, None, false).await?;
        let ctx = self.step_context(id)?;

        crate::log_step!(
            debug,
            "step_dispatched",
            step_id: id,
            job_id: self.job.id,
            attempt: ctx.attempt,
            in_flight: self.in_flight + 1,
        );

        let executor = Arc::clone(&self.services.executor);
        let timeout = self.settings.step_timeout;
        let sender = results.clone();
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = executor.execute_with_timeout(&ctx, timeout).await;
            let completion = StepCompletion {
                step_id: ctx.step_id.clone(),
                result,
            };
            if sender.send(completion).await.is_err() {
                debug!(
                    job_id = %ctx.job_id,
                    step_id = %ctx.step_id,
                    "Engine stopped before step completion was delivered"
                );
            }
        });
        Ok(())
    }

    fn step_context(&self, id: &StepId) -> OrchestrationResult<StepContext> {
        let step = self.job.step(id).ok_or_else(|| self.step_not_found(id))?;
        let object = self
            .job
            .object(&step.object)
            .cloned()
            .ok_or_else(|| self.step_not_found(id))?;

        let prior_outputs: BTreeMap<StepKind, StepOutput> = StepKind::PHASES
            .iter()
            .take(step.kind.phase_index())
            .filter_map(|kind| {
                self.outputs
                    .get(&StepId::for_phase(&step.object, *kind))
                    .map(|output| (*kind, output.clone()))
            })
            .collect();

        Ok(StepContext::new(
            self.job.id,
            step,
            object,
            self.services.registry.clone(),
            Arc::clone(&self.services.checkpoints),
        )
        .with_history_window(self.settings.history_window)
        .with_guidance(
            self.job
                .options
                .guidance_for(&step.object)
                .map(str::to_string),
        )
        .with_feedback(self.feedback.get(id).cloned())
        .with_prior_outputs(prior_outputs))
    }

    async fn handle_completion(&mut self, completion: StepCompletion) -> OrchestrationResult<()> {
        let StepCompletion { step_id, result } = completion;
        match result {
            Ok(output) => {
                self.feedback.remove(&step_id);
                let value = output.to_value();
                self.outputs.insert(step_id.clone(), output);
                self.transition_step(&step_id, StepEvent::Succeed, Some(value), false)
                    .await
            }
            Err(failure) => self.handle_failure(&step_id, failure).await,
        }
    }

    async fn handle_failure(
        &mut self,
        step_id: &StepId,
        failure: StepFailure,
    ) -> OrchestrationResult<()> {
        let step = self
            .job
            .step(step_id)
            .ok_or_else(|| self.step_not_found(step_id))?;
        let attempts = step.attempts;
        let reconversions = step.reconversions;
        let context = ErrorContext {
            job_id: self.job.id,
            step_id: step_id.clone(),
            attempt_number: attempts,
            max_attempts: step.attempt_limit(),
        };
        let classification = self.services.classifier.classify_error(&failure, &context);
        let reason = classification.error_message.clone();

        if classification.error_category == ErrorCategory::ValidationRejected
            && reconversions < self.settings.reconversion_budget
        {
            if let Some(step) = self.job.step_mut(step_id) {
                step.reconversions += 1;
            }
            self.feedback.insert(step_id.clone(), reason.clone());
            self.transition_step(step_id, StepEvent::Fail(reason), None, true)
                .await?;
            crate::log_step!(
                warn,
                "reconversion_requested",
                step_id: step_id,
                job_id: self.job.id,
                reconversion: reconversions + 1,
                budget: self.settings.reconversion_budget,
            );
            self.retry_at.insert(step_id.clone(), Instant::now());
            return Ok(());
        }

        if classification.is_retryable {
            let delay = self
                .settings
                .backoff
                .delay_for(attempts, classification.retry_after);
            self.transition_step(step_id, StepEvent::Fail(reason), None, true)
                .await?;
            crate::log_step!(
                warn,
                "step_retry_scheduled",
                step_id: step_id,
                job_id: self.job.id,
                attempt: attempts,
                category: classification.error_category,
                error_code: classification.error_code,
                delay_ms: delay.as_millis(),
            );
            self.retry_at.insert(step_id.clone(), Instant::now() + delay);
            return Ok(());
        }

        self.transition_step(step_id, StepEvent::Fail(reason.clone()), None, false)
            .await?;
        crate::log_step!(
            error,
            "step_failed",
            step_id: step_id,
            job_id: self.job.id,
            attempt: attempts,
            category: classification.error_category,
            error_code: classification.error_code,
            error: reason,
        );
        self.skip_blocked_steps().await
    }

    async fn handle_command(&mut self, command: EngineCommand) -> OrchestrationResult<()> {
        match (command, self.job.state) {
            (EngineCommand::Pause, JobState::Running) => {
                self.transition_job(JobEvent::Pause).await
            }
            (EngineCommand::Resume, JobState::Paused) => {
                self.transition_job(JobEvent::Resume).await
            }
            (EngineCommand::Cancel, state) if !state.is_terminal() => {
                crate::log_job!(
                    info,
                    "job_cancel_requested",
                    job_id: self.job.id,
                    in_flight: self.in_flight,
                );
                self.cancel_requested = true;
                Ok(())
            }
            (command, state) => {
                warn!(
                    job_id = %self.job.id,
                    command = ?command,
                    state = %state,
                    "Ignoring engine command"
                );
                Ok(())
            }
        }
    }

    async fn release_due_retries(&mut self) -> OrchestrationResult<()> {
        let now = Instant::now();
        let due: Vec<StepId> = self
            .retry_at
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in due {
            self.retry_at.remove(&id);
            self.transition_step(&id, StepEvent::Retry, None, false)
                .await?;
        }
        Ok(())
    }

    async fn finish_cancel(&mut self) -> OrchestrationResult<()> {
        let waiting: Vec<StepId> = self.retry_at.drain().map(|(id, _)| id).collect();
        for id in waiting {
            self.transition_step(&id, StepEvent::Retry, None, false)
                .await?;
        }
        self.transition_job(JobEvent::Cancel).await
    }

    async fn finalize(&mut self) -> OrchestrationResult<()> {
        let unfinished = self.job.unfinished_objects();
        if unfinished.is_empty() {
            return self.transition_job(JobEvent::Complete).await;
        }

        let names: Vec<String> = unfinished.iter().map(ToString::to_string).collect();
        let reason = format!(
            "{} of {} objects did not complete: {}",
            unfinished.len(),
            self.job.order.len(),
            names.join(", ")
        );
        self.transition_job(JobEvent::Fail(reason)).await
    }

    /// Apply a step event, then persist, publish and log the transition
    async fn transition_step(
        &mut self,
        id: &StepId,
        event: StepEvent,
        output: Option<serde_json::Value>,
        retryable: bool,
    ) -> OrchestrationResult<()> {
        let job_id = self.job.id;
        let step = self
            .job
            .step_mut(id)
            .ok_or_else(|| OrchestrationError::StepNotFound {
                job_id,
                step_id: id.to_string(),
            })?;
        let applied = StepStateMachine::apply(step, &event)?;

        let now = Utc::now();
        let reason = event.reason().map(str::to_string);
        let record = StepTransitionRecord {
            job_id,
            step_id: id.clone(),
            object: step.object.clone(),
            from_state: Some(applied.from),
            to_state: applied.to,
            attempts: step.attempts,
            reconversions: step.reconversions,
            reason: reason.clone(),
            retryable,
            output,
            recorded_at: now,
        };
        let notification = StepTransitionEvent {
            job_id,
            object_name: step.object.clone(),
            step_id: id.clone(),
            step_name: step.kind,
            from_status: Some(applied.from),
            to_status: applied.to,
            attempt: step.attempts,
            reason,
            timestamp: now,
        };
        self.job.updated_at = now;

        self.services.checkpoints.append_step_transition(&record).await?;
        crate::log_step!(
            debug,
            "step_transition",
            step_id: id,
            job_id: job_id,
            from: applied.from,
            to: applied.to,
            attempt: record.attempts,
        );
        self.services
            .events
            .publish(OrchestrationEvent::StepTransition(notification));
        self.publish_status();
        Ok(())
    }

    async fn transition_job(&mut self, event: JobEvent) -> OrchestrationResult<()> {
        let applied = JobStateMachine::apply(&mut self.job, &event)?;
        let now = Utc::now();
        let reason = event.error_message().map(str::to_string);

        let record = JobTransitionRecord {
            job_id: self.job.id,
            from_state: Some(applied.from),
            to_state: applied.to,
            reason: reason.clone(),
            recorded_at: now,
        };
        self.services.checkpoints.append_job_transition(&record).await?;

        let operation = match event {
            JobEvent::Start => "job_started",
            JobEvent::Pause => "job_paused",
            JobEvent::Resume => "job_resumed",
            JobEvent::Complete => "job_completed",
            JobEvent::Fail(_) => "job_failed",
            JobEvent::Cancel => "job_cancelled",
        };
        let counts = self.job.counts();
        if applied.to == JobState::Failed {
            crate::log_job!(
                error,
                operation,
                job_id: self.job.id,
                reason: reason.clone().unwrap_or_default(),
                succeeded: counts.succeeded,
                failed: counts.failed,
                skipped: counts.skipped,
            );
        } else {
            crate::log_job!(
                info,
                operation,
                job_id: self.job.id,
                from: applied.from,
                to: applied.to,
                succeeded: counts.succeeded,
            );
        }

        self.services
            .events
            .publish(OrchestrationEvent::JobTransition(JobTransitionEvent {
                job_id: self.job.id,
                from_state: Some(applied.from),
                to_state: applied.to,
                reason,
                timestamp: now,
            }));
        self.publish_status();
        Ok(())
    }

    fn publish_status(&self) {
        self.status.send_replace(self.job.status());
    }
}

impl fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("job_id", &self.job.id)
            .field("state", &self.job.state)
            .field("in_flight", &self.in_flight)
            .field("pending_retries", &self.retry_at.len())
            .field("cancel_requested", &self.cancel_requested)
            .finish_non_exhaustive()
    }
}
