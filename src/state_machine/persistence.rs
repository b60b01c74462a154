//! # Checkpoint Persistence
//!
//! Durable record of jobs and every state transition applied to them.
//!
//! ## Overview
//!
//! The workflow engine appends a transition record after every job or step state change.
//! Together with the job record written at creation time, those transitions are enough to
//! rebuild the scheduler after a restart: the latest transition per step gives its status,
//! attempt counters and the most recent step output.
//!
//! ## Key Features
//!
//! - `InMemoryCheckpointStore` for tests and embedded use
//! - `PgCheckpointStore` (feature `postgres`) storing records as JSONB

use super::errors::PersistenceResult;
use super::states::{JobState, StepState};
use crate::graph::DependencyEdge;
use crate::models::{
    DatabaseObject, Job, JobOptions, ObjectSelector, QualifiedName, StepId, WorkflowStep,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Job snapshot written once when the job is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub selector: ObjectSelector,
    pub options: JobOptions,
    pub objects: Vec<DatabaseObject>,
    pub order: Vec<QualifiedName>,
    /// Step definitions in their initial state
    pub steps: Vec<WorkflowStep>,
    pub deferred_edges: Vec<DependencyEdge>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Snapshot of a freshly planned job
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            selector: job.selector.clone(),
            options: job.options.clone(),
            objects: job.objects.values().map(|o| o.as_ref().clone()).collect(),
            order: job.order.clone(),
            steps: job.steps.clone(),
            deferred_edges: job.deferred_edges.clone(),
            created_at: job.created_at,
        }
    }
}

/// One applied step transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransitionRecord {
    pub job_id: Uuid,
    pub step_id: StepId,
    pub object: QualifiedName,
    pub from_state: Option<StepState>,
    pub to_state: StepState,
    pub attempts: u32,
    pub reconversions: u32,
    pub reason: Option<String>,
    /// Set on `failed` transitions that will be retried after backoff
    #[serde(default)]
    pub retryable: bool,
    /// Step output carried forward to later phases of the same object
    pub output: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransitionRecord {
    pub job_id: Uuid,
    pub from_state: Option<JobState>,
    pub to_state: JobState,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Final outcome of one object's migration, written by the record phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMigrationRecord {
    pub job_id: Uuid,
    pub object: QualifiedName,
    pub source_hash: String,
    pub final_definition: String,
    pub conversion_attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

/// Listing entry for a persisted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub state: JobState,
    pub object_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything persisted for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub record: JobRecord,
    pub step_transitions: Vec<StepTransitionRecord>,
    pub job_transitions: Vec<JobTransitionRecord>,
    pub object_results: Vec<ObjectMigrationRecord>,
}

impl PersistedJob {
    /// State from the most recent job transition
    pub fn state(&self) -> JobState {
        self.job_transitions
            .last()
            .map_or(JobState::Created, |t| t.to_state)
    }

    /// Most recent transition for every step that has one
    pub fn latest_step_transitions(&self) -> HashMap<&StepId, &StepTransitionRecord> {
        let mut latest = HashMap::new();
        for transition in &self.step_transitions {
            latest.insert(&transition.step_id, transition);
        }
        latest
    }

    /// Most recent output recorded for each step
    pub fn latest_outputs(&self) -> HashMap<&StepId, &serde_json::Value> {
        let mut outputs = HashMap::new();
        for transition in &self.step_transitions {
            if let Some(output) = &transition.output {
                outputs.insert(&transition.step_id, output);
            }
        }
        outputs
    }

    /// Rejection reason still owed to each step that is due to re-convert.
    ///
    /// A `failed` transition that raised the re-conversion count carries the reason; a later
    /// success clears it.
    pub fn reconversion_feedback(&self) -> HashMap<&StepId, &str> {
        let mut reconversions: HashMap<&StepId, u32> = HashMap::new();
        let mut feedback = HashMap::new();
        for transition in &self.step_transitions {
            let before = reconversions
                .insert(&transition.step_id, transition.reconversions)
                .unwrap_or(0);
            match (transition.to_state, &transition.reason) {
                (StepState::Failed, Some(reason))
                    if transition.retryable && transition.reconversions > before =>
                {
                    feedback.insert(&transition.step_id, reason.as_str());
                }
                (StepState::Succeeded, _) => {
                    feedback.remove(&transition.step_id);
                }
                _ => {}
            }
        }
        feedback
    }

    /// Steps from the job record with their durable status and counters applied
    pub fn restored_steps(&self) -> Vec<WorkflowStep> {
        let latest = self.latest_step_transitions();
        self.record
            .steps
            .iter()
            .cloned()
            .map(|mut step| {
                if let Some(transition) = latest.get(&step.id) {
                    step.status = transition.to_state;
                    step.attempts = transition.attempts;
                    step.reconversions = transition.reconversions;
                    if transition.to_state.is_terminal() {
                        step.completed_at = Some(transition.recorded_at);
                    }
                    if matches!(
                        transition.to_state,
                        StepState::Failed | StepState::Skipped
                    ) {
                        step.last_error = transition.reason.clone();
                    }
                }
                step
            })
            .collect()
    }

    /// Rebuild the job with its durable step statuses and job state applied
    pub fn restore_job(&self) -> Job {
        let record = &self.record;
        let objects = record
            .objects
            .iter()
            .map(|object| (object.name.clone(), Arc::new(object.clone())))
            .collect();

        let mut job = Job::new(
            record.job_id,
            record.selector.clone(),
            record.options.clone(),
            objects,
            record.order.clone(),
            self.restored_steps(),
            record.deferred_edges.clone(),
        );
        job.state = self.state();
        job.created_at = record.created_at;
        job.updated_at = self.summary().updated_at;
        for transition in &self.job_transitions {
            match transition.to_state {
                JobState::Running if job.started_at.is_none() => {
                    job.started_at = Some(transition.recorded_at);
                }
                state if state.is_terminal() => {
                    job.completed_at = Some(transition.recorded_at);
                    if state == JobState::Failed {
                        job.error = transition.reason.clone();
                    }
                }
                _ => {}
            }
        }
        job
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.record.job_id,
            state: self.state(),
            object_count: self.record.order.len(),
            created_at: self.record.created_at,
            updated_at: self
                .job_transitions
                .last()
                .map_or(self.record.created_at, |t| t.recorded_at),
        }
    }
}

/// Durable checkpoint storage for jobs and their transitions
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Insert or replace the job record
    async fn save_job(&self, record: &JobRecord) -> PersistenceResult<()>;

    async fn append_step_transition(&self, record: &StepTransitionRecord)
        -> PersistenceResult<()>;

    async fn append_job_transition(&self, record: &JobTransitionRecord) -> PersistenceResult<()>;

    async fn save_object_result(&self, record: &ObjectMigrationRecord) -> PersistenceResult<()>;

    async fn load_job(&self, job_id: Uuid) -> PersistenceResult<Option<PersistedJob>>;

    async fn list_jobs(&self) -> PersistenceResult<Vec<JobSummary>>;

    /// Delete a job and all of its records; returns whether the job existed
    async fn purge_job(&self, job_id: Uuid) -> PersistenceResult<bool>;
}

/// Checkpoint store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    jobs: RwLock<BTreeMap<Uuid, PersistedJob>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<F>(&self, job_id: Uuid, f: F) -> PersistenceResult<()>
    where
        F: FnOnce(&mut PersistedJob),
    {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| super::errors::PersistenceError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        f(job);
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save_job(&self, record: &JobRecord) -> PersistenceResult<()> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&record.job_id) {
            Some(existing) => existing.record = record.clone(),
            None => {
                jobs.insert(
                    record.job_id,
                    PersistedJob {
                        record: record.clone(),
                        step_transitions: Vec::new(),
                        job_transitions: Vec::new(),
                        object_results: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn append_step_transition(
        &self,
        record: &StepTransitionRecord,
    ) -> PersistenceResult<()> {
        self.with_job(record.job_id, |job| job.step_transitions.push(record.clone()))
    }

    async fn append_job_transition(&self, record: &JobTransitionRecord) -> PersistenceResult<()> {
        self.with_job(record.job_id, |job| job.job_transitions.push(record.clone()))
    }

    async fn save_object_result(&self, record: &ObjectMigrationRecord) -> PersistenceResult<()> {
        self.with_job(record.job_id, |job| {
            job.object_results.retain(|r| r.object != record.object);
            job.object_results.push(record.clone());
        })
    }

    async fn load_job(&self, job_id: Uuid) -> PersistenceResult<Option<PersistedJob>> {
        Ok(self.jobs.read().get(&job_id).cloned())
    }

    async fn list_jobs(&self) -> PersistenceResult<Vec<JobSummary>> {
        let mut summaries: Vec<JobSummary> =
            self.jobs.read().values().map(PersistedJob::summary).collect();
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }

    async fn purge_job(&self, job_id: Uuid) -> PersistenceResult<bool> {
        Ok(self.jobs.write().remove(&job_id).is_some())
    }
}

#[cfg(feature = "postgres")]
pub use postgres::PgCheckpointStore;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use crate::state_machine::errors::PersistenceError;
    use sqlx::types::Json;
    use sqlx::{PgPool, Row};

    /// Checkpoint store backed by PostgreSQL
    ///
    /// Records are stored as JSONB payloads; transition tables are append-only and
    /// ordered by a `BIGSERIAL` sort key.
    #[derive(Debug, Clone)]
    pub struct PgCheckpointStore {
        pool: PgPool,
    }

    impl PgCheckpointStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        pub async fn connect(database_url: &str, max_connections: u32) -> PersistenceResult<Self> {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await?;
            Ok(Self::new(pool))
        }

        pub fn pool(&self) -> &PgPool {
            &self.pool
        }

        /// Create the checkpoint tables if they do not exist
        pub async fn migrate(&self) -> PersistenceResult<()> {
            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS dbrefactor_jobs (
                    job_id UUID PRIMARY KEY,
                    state TEXT NOT NULL,
                    record JSONB NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS dbrefactor_step_transitions (
                    sort_key BIGSERIAL PRIMARY KEY,
                    job_id UUID NOT NULL REFERENCES dbrefactor_jobs (job_id) ON DELETE CASCADE,
                    step_id TEXT NOT NULL,
                    to_state TEXT NOT NULL,
                    payload JSONB NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS dbrefactor_job_transitions (
                    sort_key BIGSERIAL PRIMARY KEY,
                    job_id UUID NOT NULL REFERENCES dbrefactor_jobs (job_id) ON DELETE CASCADE,
                    to_state TEXT NOT NULL,
                    payload JSONB NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS dbrefactor_object_results (
                    job_id UUID NOT NULL REFERENCES dbrefactor_jobs (job_id) ON DELETE CASCADE,
                    object_name TEXT NOT NULL,
                    payload JSONB NOT NULL,
                    PRIMARY KEY (job_id, object_name)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_dbrefactor_step_transitions_job \
                 ON dbrefactor_step_transitions (job_id, sort_key)",
            ];

            for statement in statements {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok(())
        }

        async fn fetch_payloads<T>(&self, sql: &str, job_id: Uuid) -> PersistenceResult<Vec<T>>
        where
            T: for<'de> Deserialize<'de> + Send + Unpin + 'static,
        {
            let rows = sqlx::query(sql).bind(job_id).fetch_all(&self.pool).await?;
            rows.into_iter()
                .map(|row| {
                    row.try_get::<Json<T>, _>("payload")
                        .map(|json| json.0)
                        .map_err(PersistenceError::from)
                })
                .collect()
        }
    }

    #[async_trait]
    impl CheckpointStore for PgCheckpointStore {
        async fn save_job(&self, record: &JobRecord) -> PersistenceResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dbrefactor_jobs (job_id, state, record, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $4)
                ON CONFLICT (job_id) DO UPDATE SET record = EXCLUDED.record, updated_at = NOW()
                "#,
            )
            .bind(record.job_id)
            .bind(JobState::Created.to_string())
            .bind(Json(record))
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::TransitionSaveFailed {
                reason: format!("Failed to save job {}: {e}", record.job_id),
            })?;
            Ok(())
        }

        async fn append_step_transition(
            &self,
            record: &StepTransitionRecord,
        ) -> PersistenceResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dbrefactor_step_transitions (job_id, step_id, to_state, payload)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(record.job_id)
            .bind(record.step_id.as_str())
            .bind(record.to_state.to_string())
            .bind(Json(record))
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::TransitionSaveFailed {
                reason: format!("Failed to insert step transition: {e}"),
            })?;
            Ok(())
        }

        async fn append_job_transition(
            &self,
            record: &JobTransitionRecord,
        ) -> PersistenceResult<()> {
            // Start a transaction to keep the job row and its transitions consistent
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO dbrefactor_job_transitions (job_id, to_state, payload)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(record.job_id)
            .bind(record.to_state.to_string())
            .bind(Json(record))
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::TransitionSaveFailed {
                reason: format!("Failed to insert job transition: {e}"),
            })?;

            let updated = sqlx::query(
                "UPDATE dbrefactor_jobs SET state = $2, updated_at = $3 WHERE job_id = $1",
            )
            .bind(record.job_id)
            .bind(record.to_state.to_string())
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(PersistenceError::JobNotFound {
                    job_id: record.job_id.to_string(),
                });
            }

            tx.commit().await?;
            Ok(())
        }

        async fn save_object_result(
            &self,
            record: &ObjectMigrationRecord,
        ) -> PersistenceResult<()> {
            sqlx::query(
                r#"
                INSERT INTO dbrefactor_object_results (job_id, object_name, payload)
                VALUES ($1, $2, $3)
                ON CONFLICT (job_id, object_name) DO UPDATE SET payload = EXCLUDED.payload
                "#,
            )
            .bind(record.job_id)
            .bind(record.object.to_string())
            .bind(Json(record))
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn load_job(&self, job_id: Uuid) -> PersistenceResult<Option<PersistedJob>> {
            let row = sqlx::query("SELECT record FROM dbrefactor_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

            let Some(row) = row else {
                return Ok(None);
            };
            let record = row.try_get::<Json<JobRecord>, _>("record")?.0;

            let step_transitions = self
                .fetch_payloads(
                    "SELECT payload FROM dbrefactor_step_transitions WHERE job_id = $1 ORDER BY sort_key",
                    job_id,
                )
                .await?;
            let job_transitions = self
                .fetch_payloads(
                    "SELECT payload FROM dbrefactor_job_transitions WHERE job_id = $1 ORDER BY sort_key",
                    job_id,
                )
                .await?;
            let object_results = self
                .fetch_payloads(
                    "SELECT payload FROM dbrefactor_object_results WHERE job_id = $1 ORDER BY object_name",
                    job_id,
                )
                .await?;

            Ok(Some(PersistedJob {
                record,
                step_transitions,
                job_transitions,
                object_results,
            }))
        }

        async fn list_jobs(&self) -> PersistenceResult<Vec<JobSummary>> {
            let rows = sqlx::query(
                r#"
                SELECT job_id, state, jsonb_array_length(record -> 'order') AS object_count,
                       created_at, updated_at
                FROM dbrefactor_jobs
                ORDER BY created_at
                "#,
            )
            .fetch_all(&self.pool)
            .await?;

            rows.into_iter()
                .map(|row| -> PersistenceResult<JobSummary> {
                    let state: String = row.try_get("state")?;
                    let object_count: i32 = row.try_get("object_count")?;
                    Ok(JobSummary {
                        job_id: row.try_get("job_id")?,
                        state: state.parse().map_err(|reason| PersistenceError::InvalidData {
                            field: "state".to_string(),
                            reason,
                        })?,
                        object_count: usize::try_from(object_count).unwrap_or_default(),
                        created_at: row.try_get("created_at")?,
                        updated_at: row.try_get("updated_at")?,
                    })
                })
                .collect()
        }

        async fn purge_job(&self, job_id: Uuid) -> PersistenceResult<bool> {
            let result = sqlx::query("DELETE FROM dbrefactor_jobs WHERE job_id = $1")
                .bind(job_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepKind;

    fn job_record() -> JobRecord {
        let object = QualifiedName::new("app", "t1");
        JobRecord {
            job_id: Uuid::new_v4(),
            selector: ObjectSelector::schema("app"),
            options: JobOptions::default(),
            objects: vec![],
            order: vec![object.clone()],
            steps: vec![
                WorkflowStep::new(object.clone(), StepKind::Fetch, vec![], 0, 3),
                WorkflowStep::new(
                    object.clone(),
                    StepKind::Convert,
                    vec![StepId::for_phase(&object, StepKind::Fetch)],
                    0,
                    3,
                ),
            ],
            deferred_edges: vec![],
            created_at: Utc::now(),
        }
    }

    fn transition(
        job_id: Uuid,
        step: &str,
        to: StepState,
        attempts: u32,
        output: Option<serde_json::Value>,
    ) -> StepTransitionRecord {
        StepTransitionRecord {
            job_id,
            step_id: StepId::from(step),
            object: QualifiedName::new("app", "t1"),
            from_state: None,
            to_state: to,
            attempts,
            reconversions: 0,
            reason: None,
            retryable: false,
            output,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_restores_latest_step_state() {
        let store = InMemoryCheckpointStore::new();
        let record = job_record();
        let job_id = record.job_id;
        store.save_job(&record).await.unwrap();

        store
            .append_step_transition(&transition(
                job_id,
                "app.t1::fetch",
                StepState::Running,
                1,
                None,
            ))
            .await
            .unwrap();
        store
            .append_step_transition(&transition(
                job_id,
                "app.t1::fetch",
                StepState::Succeeded,
                1,
                Some(serde_json::json!({"definition": "CREATE TABLE t1 (id INT)"})),
            ))
            .await
            .unwrap();
        store
            .append_job_transition(&JobTransitionRecord {
                job_id,
                from_state: Some(JobState::Created),
                to_state: JobState::Running,
                reason: None,
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();

        let persisted = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(persisted.state(), JobState::Running);

        let steps = persisted.restored_steps();
        assert_eq!(steps[0].status, StepState::Succeeded);
        assert_eq!(steps[0].attempts, 1);
        assert_eq!(steps[1].status, StepState::Pending);
        assert!(persisted
            .latest_outputs()
            .contains_key(&StepId::from("app.t1::fetch")));

        let job = persisted.restore_job();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());
        assert_eq!(
            job.step(&StepId::from("app.t1::fetch")).unwrap().status,
            StepState::Succeeded
        );
        assert_eq!(JobRecord::from_job(&job).steps.len(), 2);
    }

    #[test]
    fn test_reconversion_feedback_follows_rejections() {
        let record = job_record();
        let job_id = record.job_id;
        let convert = "app.t1::convert";
        let mut persisted = PersistedJob {
            record,
            step_transitions: vec![
                transition(job_id, convert, StepState::Running, 1, None),
                StepTransitionRecord {
                    reconversions: 1,
                    reason: Some("column id lost NOT NULL".into()),
                    retryable: true,
                    ..transition(job_id, convert, StepState::Failed, 1, None)
                },
                StepTransitionRecord {
                    reconversions: 1,
                    ..transition(job_id, convert, StepState::Running, 2, None)
                },
                StepTransitionRecord {
                    reconversions: 1,
                    reason: Some("connection reset".into()),
                    retryable: true,
                    ..transition(job_id, convert, StepState::Failed, 2, None)
                },
            ],
            job_transitions: vec![],
            object_results: vec![],
        };

        let id = StepId::from(convert);
        let feedback = persisted.reconversion_feedback();
        assert_eq!(feedback.get(&id).copied(), Some("column id lost NOT NULL"));

        persisted.step_transitions.push(StepTransitionRecord {
            reconversions: 1,
            ..transition(job_id, convert, StepState::Succeeded, 3, None)
        });
        assert!(persisted.reconversion_feedback().is_empty());
    }

    #[tokio::test]
    async fn test_transitions_require_job_and_purge_removes_all() {
        let store = InMemoryCheckpointStore::new();
        let orphan = transition(Uuid::new_v4(), "x.y::fetch", StepState::Ready, 0, None);
        assert!(store.append_step_transition(&orphan).await.is_err());

        let record = job_record();
        store.save_job(&record).await.unwrap();
        assert_eq!(store.list_jobs().await.unwrap().len(), 1);
        assert!(store.purge_job(record.job_id).await.unwrap());
        assert!(!store.purge_job(record.job_id).await.unwrap());
        assert!(store.load_job(record.job_id).await.unwrap().is_none());
    }
}
