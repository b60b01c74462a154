use super::{
    errors::{guard_failed, invalid_transition, StateMachineResult},
    events::StepEvent,
    states::StepState,
};
use crate::models::WorkflowStep;
use chrono::Utc;

/// A transition that was applied to a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedTransition<S> {
    pub from: S,
    pub to: S,
}

/// Workflow step transition table.
///
/// ```text
/// pending --promote--> ready --start--> running --succeed--> succeeded
///    |                   |                 |
///    +------skip---------+                 +--fail--> failed --retry--> ready
/// ```
pub struct StepStateMachine;

impl StepStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: StepState,
        event: &StepEvent,
    ) -> StateMachineResult<StepState> {
        let target = match (current_state, event) {
            (StepState::Pending, StepEvent::Promote) => StepState::Ready,

            (StepState::Ready, StepEvent::Start) => StepState::Running,

            (StepState::Running, StepEvent::Succeed) => StepState::Succeeded,

            // Failures while running, and pre-dispatch failures (e.g. an invalid binding)
            (StepState::Running, StepEvent::Fail(_)) => StepState::Failed,
            (StepState::Ready, StepEvent::Fail(_)) => StepState::Failed,

            (StepState::Failed, StepEvent::Retry) => StepState::Ready,

            (StepState::Pending, StepEvent::Skip(_)) => StepState::Skipped,
            (StepState::Ready, StepEvent::Skip(_)) => StepState::Skipped,

            (from_state, event) => {
                return Err(invalid_transition(from_state, event.event_type()));
            }
        };

        Ok(target)
    }

    /// Apply an event to a step, updating its status, attempt counter and timestamps.
    ///
    /// `Start` increments the attempt counter. `Retry` is guarded by the step's
    /// remaining attempt budget, including attempts granted by re-conversions.
    pub fn apply(
        step: &mut WorkflowStep,
        event: &StepEvent,
    ) -> StateMachineResult<AppliedTransition<StepState>> {
        let from = step.status;
        let to = Self::determine_target_state(from, event)?;

        match event {
            StepEvent::Retry if !step.has_retry_budget() => {
                return Err(guard_failed(format!(
                    "step {} exhausted its retry budget ({} of {} attempts)",
                    step.id,
                    step.attempts,
                    step.attempt_limit()
                )));
            }
            StepEvent::Start => {
                step.attempts += 1;
                step.started_at = Some(Utc::now());
            }
            StepEvent::Succeed => {
                step.completed_at = Some(Utc::now());
                step.last_error = None;
            }
            StepEvent::Fail(reason) | StepEvent::Skip(reason) => {
                step.completed_at = Some(Utc::now());
                step.last_error = Some(reason.clone());
            }
            StepEvent::Retry => {
                step.completed_at = None;
            }
            StepEvent::Promote => {}
        }

        step.status = to;
        Ok(AppliedTransition { from, to })
    }
}
