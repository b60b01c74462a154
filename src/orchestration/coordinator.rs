//! # Job Coordinator
//!
//! Public entry point for migration jobs.
//!
//! ## Overview
//!
//! The coordinator owns no job state itself. Each started or resumed job gets its own
//! [`WorkflowEngine`] task; the coordinator keeps an [`EngineHandle`] per live job for
//! control commands and status snapshots, and falls back to the checkpoint store for jobs
//! that are not running in this process.
//!
//! ## Lifecycle
//!
//! ```text
//! start_job ─▶ discover ─▶ catalog ─▶ graph ─▶ plan ─▶ save_job ─▶ spawn engine
//!                                                                     │
//!             pause_job / resume_job / cancel_job ──── commands ──────┤
//!             get_status / wait_for_completion ◀──── watch status ────┘
//! ```
//!
//! Jobs persist until [`JobCoordinator::purge_job`] removes them.

use super::error_classifier::{ErrorClassifier, StandardErrorClassifier};
use super::event_publisher::{
    EventPublisher, JobTransitionEvent, OrchestrationEvent, StepTransitionEvent,
};
use super::job_planner::{JobPlanner, PlannerDefaults};
use super::step_executor::StepExecutor;
use super::workflow_engine::{
    EngineCommand, EngineHandle, EngineServices, EngineSettings, WorkflowEngine,
};
use crate::catalog::ObjectCatalog;
use crate::config::MigrationConfig;
use crate::errors::{OrchestrationError, OrchestrationResult};
use crate::graph::MigrationPlan;
use crate::models::{JobOptions, JobStatus, ObjectSelector};
use crate::providers::ProviderRegistry;
use crate::state_machine::{
    CheckpointStore, InMemoryCheckpointStore, JobEvent, JobRecord, JobState, JobStateMachine,
    JobSummary, JobTransitionRecord, PersistedJob,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Job counts by state across every persisted job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub total: usize,
    pub created: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs with an engine task in this process
    pub live: usize,
}

pub struct JobCoordinator {
    config: Arc<MigrationConfig>,
    services: EngineServices,
    planner: JobPlanner,
    jobs: Arc<DashMap<Uuid, EngineHandle>>,
}

impl JobCoordinator {
    pub fn new(
        config: Arc<MigrationConfig>,
        registry: ProviderRegistry,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let planner = JobPlanner::new(PlannerDefaults {
            max_attempts: config.execution.max_attempts,
            auto_break_cycles: config.dependency_graph.auto_break_cycles,
        });
        let services = EngineServices {
            registry,
            checkpoints,
            executor: Arc::new(StepExecutor::new()),
            classifier: Arc::new(StandardErrorClassifier::new()),
            events: EventPublisher::new(config.events.buffer_size),
        };

        Self {
            config,
            services,
            planner,
            jobs: Arc::new(DashMap::new()),
        }
    }

    /// Coordinator with an in-memory checkpoint store
    pub fn in_memory(config: Arc<MigrationConfig>, registry: ProviderRegistry) -> Self {
        Self::new(config, registry, Arc::new(InMemoryCheckpointStore::new()))
    }

    /// Coordinator whose checkpoint store follows `persistence.database_url`
    #[cfg(feature = "postgres")]
    pub async fn from_config(
        config: Arc<MigrationConfig>,
        registry: ProviderRegistry,
    ) -> OrchestrationResult<Self> {
        let checkpoints: Arc<dyn CheckpointStore> = match &config.persistence.database_url {
            Some(url) => {
                let store = crate::state_machine::PgCheckpointStore::connect(
                    url,
                    config.persistence.max_connections,
                )
                .await?;
                store.migrate().await?;
                Arc::new(store)
            }
            None => Arc::new(InMemoryCheckpointStore::new()),
        };
        Ok(Self::new(config, registry, checkpoints))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.services.classifier = classifier;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.services.checkpoints
    }

    /// Discover the selection, plan it and start executing.
    ///
    /// Returns once the job is persisted; execution continues on its own task. Structural
    /// problems (cycles without auto-break, unknown references under the `reject` policy)
    /// fail here and no job is created.
    #[instrument(skip(self, options), fields(schema = ?selector.schema))]
    pub async fn start_job(
        &self,
        selector: ObjectSelector,
        options: JobOptions,
    ) -> OrchestrationResult<Uuid> {
        let catalog = ObjectCatalog::discover(
            self.services.registry.discovery().as_ref(),
            &selector,
            &options,
        )
        .await
        .map_err(OrchestrationError::DiscoveryFailed)?;

        self.start_job_from_catalog(&catalog, selector, options).await
    }

    /// Start a job over an already staged catalog
    #[instrument(skip_all, fields(objects = catalog.len()))]
    pub async fn start_job_from_catalog(
        &self,
        catalog: &ObjectCatalog,
        selector: ObjectSelector,
        options: JobOptions,
    ) -> OrchestrationResult<Uuid> {
        let graph = catalog.build(self.config.dependency_graph.graph_policy())?;
        let job_id = Uuid::new_v4();
        let job = self.planner.plan(job_id, selector, options, graph)?;

        self.services
            .checkpoints
            .save_job(&JobRecord::from_job(&job))
            .await?;

        let settings = EngineSettings::resolve(&self.config, &job.options);
        let (engine, handle) = WorkflowEngine::new(job, settings, self.services.clone());
        self.spawn_engine(engine, handle)?;
        Ok(job_id)
    }

    /// Read-only plan for a selection: order, waves, cycles and recommendations
    #[instrument(skip(self, options))]
    pub async fn plan(
        &self,
        selector: &ObjectSelector,
        options: &JobOptions,
    ) -> OrchestrationResult<MigrationPlan> {
        let catalog = ObjectCatalog::discover(
            self.services.registry.discovery().as_ref(),
            selector,
            options,
        )
        .await
        .map_err(OrchestrationError::DiscoveryFailed)?;

        let graph = catalog.build(self.config.dependency_graph.graph_policy())?;
        let auto_break = options
            .auto_break_cycles
            .unwrap_or(self.config.dependency_graph.auto_break_cycles);
        Ok(MigrationPlan::analyse(graph, auto_break))
    }

    pub async fn get_status(&self, job_id: Uuid) -> OrchestrationResult<JobStatus> {
        if let Some(handle) = self.live_handle(job_id) {
            return Ok(handle.status());
        }
        let persisted = self.load(job_id).await?;
        Ok(persisted.restore_job().status())
    }

    /// Request cooperative cancellation.
    ///
    /// In-flight steps finish their current attempt; nothing new is dispatched.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid) -> OrchestrationResult<()> {
        if let Some(handle) = self.running_handle(job_id) {
            let state = handle.status().state;
            if state.is_terminal() {
                return Err(invalid_state(
                    job_id,
                    state,
                    &[JobState::Created, JobState::Running, JobState::Paused],
                ));
            }
            return handle.send(EngineCommand::Cancel).await;
        }

        self.apply_offline(
            job_id,
            JobEvent::Cancel,
            &[JobState::Created, JobState::Running, JobState::Paused],
        )
        .await
    }

    /// Stop dispatching new steps; in-flight steps finish
    #[instrument(skip(self))]
    pub async fn pause_job(&self, job_id: Uuid) -> OrchestrationResult<()> {
        if let Some(handle) = self.running_handle(job_id) {
            return match handle.status().state {
                JobState::Running => handle.send(EngineCommand::Pause).await,
                state => Err(invalid_state(job_id, state, &[JobState::Running])),
            };
        }

        self.apply_offline(job_id, JobEvent::Pause, &[JobState::Running])
            .await
    }

    /// Continue a paused job, or reload a job that is not running in this process and
    /// continue dispatching from its last checkpoint
    #[instrument(skip(self))]
    pub async fn resume_job(&self, job_id: Uuid) -> OrchestrationResult<()> {
        if let Some(handle) = self.running_handle(job_id) {
            return match handle.status().state {
                JobState::Paused => handle.send(EngineCommand::Resume).await,
                JobState::Created | JobState::Running => Ok(()),
                state => Err(invalid_state(job_id, state, &[JobState::Paused])),
            };
        }

        let persisted = self.load(job_id).await?;
        let state = persisted.state();
        if state.is_terminal() {
            return Err(invalid_state(
                job_id,
                state,
                &[JobState::Created, JobState::Running, JobState::Paused],
            ));
        }

        let settings = EngineSettings::resolve(&self.config, &persisted.record.options);
        let (engine, handle) = WorkflowEngine::restore(&persisted, settings, self.services.clone());
        let counts = engine.job().counts();
        crate::log_job!(
            info,
            "job_resuming",
            job_id: job_id,
            state: state,
            succeeded: counts.succeeded,
            remaining: counts.total - counts.succeeded - counts.skipped,
        );

        if state == JobState::Paused {
            handle.send(EngineCommand::Resume).await?;
        }
        self.spawn_engine(engine, handle)
    }

    /// This job's step transitions from now until it reaches a terminal state.
    ///
    /// Past transitions are not replayed; a job that is already terminal yields an empty
    /// stream.
    pub async fn stream_events(
        &self,
        job_id: Uuid,
    ) -> OrchestrationResult<BoxStream<'static, StepTransitionEvent>> {
        let events = self.services.events.job_step_events(job_id);
        let state = match self.live_handle(job_id) {
            Some(handle) => handle.status().state,
            None => self.load(job_id).await?.state(),
        };

        if state.is_terminal() {
            return Ok(stream::empty().boxed());
        }
        Ok(events.boxed())
    }

    /// Every orchestration event of every job
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.services.events.subscribe()
    }

    pub async fn list_jobs(&self) -> OrchestrationResult<Vec<JobSummary>> {
        Ok(self.services.checkpoints.list_jobs().await?)
    }

    /// Remove a job and its checkpoints; active jobs must be cancelled first
    #[instrument(skip(self))]
    pub async fn purge_job(&self, job_id: Uuid) -> OrchestrationResult<bool> {
        if let Some(handle) = self.running_handle(job_id) {
            let state = handle.status().state;
            if !state.is_terminal() {
                return Err(invalid_state(
                    job_id,
                    state,
                    &[JobState::Completed, JobState::Failed, JobState::Cancelled],
                ));
            }
        }

        self.jobs.remove(&job_id);
        let removed = self.services.checkpoints.purge_job(job_id).await?;
        if removed {
            crate::log_job!(info, "job_purged", job_id: job_id,);
        }
        Ok(removed)
    }

    pub async fn engine_stats(&self) -> OrchestrationResult<EngineStats> {
        let summaries = self.list_jobs().await?;
        let mut stats = EngineStats {
            total: summaries.len(),
            live: self.jobs.iter().filter(|h| !h.value().is_stopped()).count(),
            ..EngineStats::default()
        };

        for summary in &summaries {
            match summary.state {
                JobState::Created => stats.created += 1,
                JobState::Running => stats.running += 1,
                JobState::Paused => stats.paused += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    /// Wait until a live job reaches a terminal state.
    ///
    /// Jobs not running in this process return their persisted status immediately. A paused
    /// job keeps this waiting until it is resumed or cancelled.
    pub async fn wait_for_completion(&self, job_id: Uuid) -> OrchestrationResult<JobStatus> {
        match self.live_handle(job_id) {
            Some(handle) => Ok(handle.wait_for_terminal().await),
            None => self.get_status(job_id).await,
        }
    }

    fn live_handle(&self, job_id: Uuid) -> Option<EngineHandle> {
        self.jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    /// Handle of an engine that is still accepting commands
    fn running_handle(&self, job_id: Uuid) -> Option<EngineHandle> {
        self.live_handle(job_id).filter(|handle| !handle.is_stopped())
    }

    async fn load(&self, job_id: Uuid) -> OrchestrationResult<PersistedJob> {
        self.services
            .checkpoints
            .load_job(job_id)
            .await?
            .ok_or(OrchestrationError::JobNotFound { job_id })
    }

    fn spawn_engine(
        &self,
        engine: WorkflowEngine,
        handle: EngineHandle,
    ) -> OrchestrationResult<()> {
        let job_id = handle.job_id();
        match self.jobs.entry(job_id) {
            Entry::Occupied(entry) if !entry.get().is_stopped() => {
                return Err(invalid_state(
                    job_id,
                    entry.get().status().state,
                    &[JobState::Paused],
                ));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(handle);
            }
            Entry::Vacant(entry) => {
                entry.insert(handle);
            }
        }

        tokio::spawn(async move {
            match engine.run().await {
                Ok(status) => {
                    debug!(job_id = %job_id, state = %status.state, "Workflow engine finished")
                }
                Err(err) => {
                    debug!(job_id = %job_id, error = %err, "Workflow engine stopped with an error")
                }
            }
        });
        Ok(())
    }

    /// Apply a lifecycle event to a job that has no engine in this process
    async fn apply_offline(
        &self,
        job_id: Uuid,
        event: JobEvent,
        expected: &[JobState],
    ) -> OrchestrationResult<()> {
        let persisted = self.load(job_id).await?;
        let mut job = persisted.restore_job();
        if !expected.contains(&job.state) {
            return Err(invalid_state(job_id, job.state, expected));
        }

        let applied = JobStateMachine::apply(&mut job, &event)?;
        let now = Utc::now();
        self.services
            .checkpoints
            .append_job_transition(&JobTransitionRecord {
                job_id,
                from_state: Some(applied.from),
                to_state: applied.to,
                reason: None,
                recorded_at: now,
            })
            .await?;
        self.services
            .events
            .publish(OrchestrationEvent::JobTransition(JobTransitionEvent {
                job_id,
                from_state: Some(applied.from),
                to_state: applied.to,
                reason: None,
                timestamp: now,
            }));

        info!(
            job_id = %job_id,
            from = %applied.from,
            to = %applied.to,
            "Applied {} to job without a running engine",
            event.event_type()
        );
        Ok(())
    }
}

fn invalid_state(job_id: Uuid, current: JobState, expected: &[JobState]) -> OrchestrationError {
    OrchestrationError::InvalidJobState {
        job_id,
        current_state: current.to_string(),
        expected_states: expected.iter().map(ToString::to_string).collect(),
    }
}

impl std::fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("live_jobs", &self.jobs.len())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
