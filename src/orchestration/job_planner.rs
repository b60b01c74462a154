//! # Job Planner
//!
//! Turns a dependency graph into a job: one phase chain per executable object, linked
//! across objects so that an object's chain only starts after every dependency has
//! finished its own chain.
//!
//! ```text
//! T1: fetch → convert → validate → execute → record
//!                                               │
//! T2: fetch ◀───────────────────────────────────┘ → convert → ...
//! ```
//!
//! Placeholder nodes (objects outside the discovered set) get no steps and impose no
//! prerequisites; they are treated as already present on the target.

use crate::errors::{GraphError, OrchestrationError, OrchestrationResult};
use crate::graph::{DependencyEdge, DependencyGraph};
use crate::models::{
    DatabaseObject, Job, JobOptions, ObjectSelector, QualifiedName, StepId, StepKind,
    WorkflowStep,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Execution defaults applied where the job's options leave a value unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerDefaults {
    pub max_attempts: u32,
    pub auto_break_cycles: bool,
}

impl Default for PlannerDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            auto_break_cycles: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobPlanner {
    defaults: PlannerDefaults,
}

impl JobPlanner {
    pub fn new(defaults: PlannerDefaults) -> Self {
        Self { defaults }
    }

    /// Order the graph and build the job's step table.
    ///
    /// Fails with `GraphError::CyclicDependency` when the graph has cycles and automatic
    /// breaking is not enabled; otherwise the removed edges are recorded on the job.
    pub fn plan(
        &self,
        job_id: Uuid,
        selector: ObjectSelector,
        options: JobOptions,
        mut graph: DependencyGraph,
    ) -> OrchestrationResult<Job> {
        let auto_break = options
            .auto_break_cycles
            .unwrap_or(self.defaults.auto_break_cycles);
        let max_attempts = options.max_attempts.unwrap_or(self.defaults.max_attempts);

        let deferred_edges: Vec<DependencyEdge> = if graph.has_cycles() {
            if !auto_break {
                return Err(GraphError::CyclicDependency {
                    cycles: graph.detect_cycles(),
                }
                .into());
            }
            let removed = graph.break_cycles();
            crate::log_job!(
                warn,
                "cycles_broken",
                job_id: job_id,
                deferred_edges: removed.iter().map(ToString::to_string).collect::<Vec<_>>(),
            );
            removed
        } else {
            Vec::new()
        };

        let order: Vec<QualifiedName> = graph
            .topological_order()?
            .into_iter()
            .filter(|name| graph.node(name).is_some_and(|n| !n.is_placeholder()))
            .collect();

        if order.is_empty() {
            return Err(OrchestrationError::EmptySelection {
                reason: "no executable objects matched the selection".to_string(),
            });
        }

        let executable: HashSet<&QualifiedName> = order.iter().collect();
        let mut steps = Vec::with_capacity(order.len() * StepKind::PHASES.len());

        for (position, name) in order.iter().enumerate() {
            let upstream: Vec<StepId> = graph
                .dependencies_of(name)
                .into_iter()
                .filter(|dependency| executable.contains(dependency))
                .map(|dependency| StepId::for_phase(dependency, StepKind::Record))
                .collect();

            let mut previous: Option<StepId> = None;
            for kind in StepKind::PHASES {
                let prerequisites = match previous.take() {
                    Some(prior_phase) => vec![prior_phase],
                    None => upstream.clone(),
                };
                let step = WorkflowStep::new(
                    name.clone(),
                    kind,
                    prerequisites,
                    position,
                    max_attempts,
                );
                previous = Some(step.id.clone());
                steps.push(step);
            }
        }

        let objects: BTreeMap<QualifiedName, Arc<DatabaseObject>> = order
            .iter()
            .filter_map(|name| {
                graph
                    .node(name)
                    .map(|object| (name.clone(), Arc::new(object.clone())))
            })
            .collect();

        crate::log_job!(
            info,
            "job_planned",
            job_id: job_id,
            objects: order.len(),
            steps: steps.len(),
        );

        Ok(Job::new(
            job_id,
            selector,
            options,
            objects,
            order,
            steps,
            deferred_edges,
        ))
    }
}
