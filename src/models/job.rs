//! # Migration Job Model
//!
//! A job binds a selected object set, its dependency-ordered step chains and the
//! aggregate job state.
//!
//! ## Overview
//!
//! Jobs are created by the coordinator, own their `WorkflowStep`s exclusively, and are
//! persisted until explicitly purged. Status reporting (`JobStatus`) is derived from the
//! step table: per-object sub-status plus aggregate counts.

use super::{DatabaseObject, QualifiedName, StepId, StepKind, WorkflowStep};
use crate::graph::DependencyEdge;
use crate::state_machine::{JobState, StepState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// Which objects a job migrates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSelector {
    /// Schema filter handed to discovery; `None` means every visible schema
    pub schema: Option<String>,
    /// Explicit object set; empty means the whole (filtered) schema
    #[serde(default)]
    pub objects: Vec<QualifiedName>,
}

impl ObjectSelector {
    pub fn schema(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            objects: Vec::new(),
        }
    }

    pub fn objects(objects: Vec<QualifiedName>) -> Self {
        Self {
            schema: None,
            objects,
        }
    }

    pub fn selects(&self, name: &QualifiedName) -> bool {
        let schema_ok = self
            .schema
            .as_deref()
            .map_or(true, |schema| name.schema().eq_ignore_ascii_case(schema));
        let object_ok = self.objects.is_empty() || self.objects.contains(name);
        schema_ok && object_ok
    }
}

/// Caller-supplied per-job options; unset values fall back to configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Only objects matching one of these patterns (`schema.name` or bare name)
    pub include: Vec<String>,
    /// Objects matching any of these patterns are left out
    pub exclude: Vec<String>,
    pub auto_break_cycles: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub max_attempts: Option<u32>,
    pub reconversion_budget: Option<u32>,
    /// Human guidance text keyed by object (qualified or bare name)
    pub guidance: HashMap<String, String>,
}

impl JobOptions {
    pub fn admits(&self, name: &QualifiedName) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| name.matches(p));
        let excluded = self.exclude.iter().any(|p| name.matches(p));
        included && !excluded
    }

    pub fn guidance_for(&self, name: &QualifiedName) -> Option<&str> {
        self.guidance
            .get(&name.to_string())
            .or_else(|| {
                self.guidance
                    .iter()
                    .find(|(pattern, _)| name.matches(pattern))
                    .map(|(_, text)| text)
            })
            .map(String::as_str)
    }
}

/// Aggregate step counts for a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StepCounts {
    fn record(&mut self, state: StepState) {
        self.total += 1;
        match state {
            StepState::Pending => self.pending += 1,
            StepState::Ready => self.ready += 1,
            StepState::Running => self.running += 1,
            StepState::Succeeded => self.succeeded += 1,
            StepState::Failed => self.failed += 1,
            StepState::Skipped => self.skipped += 1,
        }
    }
}

/// Sub-status of one object within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProgress {
    pub status: StepState,
    /// First phase that has not succeeded yet
    pub current_phase: Option<StepKind>,
    pub phases: BTreeMap<StepKind, StepState>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Point-in-time status report for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub per_object: BTreeMap<String, ObjectProgress>,
    pub counts: StepCounts,
    pub deferred_edges: Vec<DependencyEdge>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn object(&self, name: &str) -> Option<&ObjectProgress> {
        self.per_object.get(name)
    }
}

/// A migration job and the steps it exclusively owns
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub selector: ObjectSelector,
    pub options: JobOptions,
    pub state: JobState,
    pub objects: BTreeMap<QualifiedName, Arc<DatabaseObject>>,
    /// Topological creation order of the job's objects
    pub order: Vec<QualifiedName>,
    pub steps: Vec<WorkflowStep>,
    index: HashMap<StepId, usize>,
    dependents: HashMap<StepId, Vec<StepId>>,
    /// Edges removed to break cycles before planning
    pub deferred_edges: Vec<DependencyEdge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: Uuid,
        selector: ObjectSelector,
        options: JobOptions,
        objects: BTreeMap<QualifiedName, Arc<DatabaseObject>>,
        order: Vec<QualifiedName>,
        steps: Vec<WorkflowStep>,
        deferred_edges: Vec<DependencyEdge>,
    ) -> Self {
        let now = Utc::now();
        let mut job = Self {
            id,
            selector,
            options,
            state: JobState::Created,
            objects,
            order,
            steps,
            index: HashMap::new(),
            dependents: HashMap::new(),
            deferred_edges,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            error: None,
        };
        job.reindex();
        job
    }

    fn reindex(&mut self) {
        self.index = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.id.clone(), i))
            .collect();

        let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::new();
        for step in &self.steps {
            for prerequisite in &step.prerequisites {
                dependents
                    .entry(prerequisite.clone())
                    .or_default()
                    .push(step.id.clone());
            }
        }
        self.dependents = dependents;
    }

    pub fn step(&self, id: &StepId) -> Option<&WorkflowStep> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn step_mut(&mut self, id: &StepId) -> Option<&mut WorkflowStep> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.steps[i]),
            None => None,
        }
    }

    pub fn object(&self, name: &QualifiedName) -> Option<&Arc<DatabaseObject>> {
        self.objects.get(name)
    }

    /// Steps that list `id` as a prerequisite
    pub fn direct_dependents(&self, id: &StepId) -> &[StepId] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    /// Every step reachable from `id` through dependent links, in discovery order
    pub fn transitive_dependents(&self, id: &StepId) -> Vec<StepId> {
        let mut seen = std::collections::HashSet::new();
        let mut stack: Vec<StepId> = self.direct_dependents(id).to_vec();
        let mut result = Vec::new();
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.direct_dependents(&next).iter().cloned());
                result.push(next);
            }
        }
        result
    }

    /// Whether every prerequisite of the step has succeeded
    pub fn prerequisites_met(&self, step: &WorkflowStep) -> bool {
        step.prerequisites.iter().all(|p| {
            self.step(p)
                .is_some_and(|prerequisite| prerequisite.status.satisfies_dependencies())
        })
    }

    pub fn counts(&self) -> StepCounts {
        let mut counts = StepCounts::default();
        for step in &self.steps {
            counts.record(step.status);
        }
        counts
    }

    fn steps_by_object(&self) -> HashMap<&QualifiedName, Vec<&WorkflowStep>> {
        let mut grouped: HashMap<&QualifiedName, Vec<&WorkflowStep>> = HashMap::new();
        for step in &self.steps {
            grouped.entry(&step.object).or_default().push(step);
        }
        grouped
    }

    /// Objects in the requested selection that never reached succeeded
    pub fn unfinished_objects(&self) -> Vec<QualifiedName> {
        let grouped = self.steps_by_object();
        self.order
            .iter()
            .filter(|name| {
                grouped
                    .get(name)
                    .and_then(|steps| progress_of(steps))
                    .is_some_and(|p| p.status != StepState::Succeeded)
            })
            .cloned()
            .collect()
    }

    pub fn status(&self) -> JobStatus {
        let grouped = self.steps_by_object();
        let per_object = self
            .order
            .iter()
            .filter_map(|name| {
                grouped
                    .get(name)
                    .and_then(|steps| progress_of(steps))
                    .map(|progress| (name.to_string(), progress))
            })
            .collect();

        JobStatus {
            job_id: self.id,
            state: self.state,
            per_object,
            counts: self.counts(),
            deferred_edges: self.deferred_edges.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Aggregate one object's phase steps: succeeded only when every phase succeeded,
/// otherwise the most significant of failed, skipped, running, ready, pending
fn progress_of(steps: &[&WorkflowStep]) -> Option<ObjectProgress> {
    if steps.is_empty() {
        return None;
    }

    let phases: BTreeMap<StepKind, StepState> = steps.iter().map(|s| (s.kind, s.status)).collect();
    let states: Vec<StepState> = phases.values().copied().collect();
    let status = if states.iter().all(|s| *s == StepState::Succeeded) {
        StepState::Succeeded
    } else if states.contains(&StepState::Failed) {
        StepState::Failed
    } else if states.contains(&StepState::Skipped) {
        StepState::Skipped
    } else if states.contains(&StepState::Running) {
        StepState::Running
    } else if states.contains(&StepState::Ready) {
        StepState::Ready
    } else {
        StepState::Pending
    };

    let current_phase = StepKind::PHASES
        .iter()
        .copied()
        .find(|kind| phases.get(kind).is_some_and(|s| *s != StepState::Succeeded));
    let attempts = steps.iter().map(|s| s.attempts).sum();
    // A failed phase explains the skips after it
    let last_error = steps
        .iter()
        .find(|s| s.status == StepState::Failed)
        .and_then(|s| s.last_error.clone())
        .or_else(|| steps.iter().filter_map(|s| s.last_error.clone()).next_back());

    Some(ObjectProgress {
        status,
        current_phase,
        phases,
        attempts,
        last_error,
    })
}
