use super::{
    errors::{invalid_transition, StateMachineResult},
    events::JobEvent,
    states::JobState,
    step_state_machine::AppliedTransition,
};
use crate::models::Job;
use chrono::Utc;

/// Job transition table.
///
/// `created -> running -> {completed | failed | cancelled}`, with `paused` reachable
/// from `running` and returning to `running` on resume.
pub struct JobStateMachine;

impl JobStateMachine {
    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: JobState,
        event: &JobEvent,
    ) -> StateMachineResult<JobState> {
        let target = match (current_state, event) {
            (JobState::Created, JobEvent::Start) => JobState::Running,

            (JobState::Running, JobEvent::Pause) => JobState::Paused,
            (JobState::Paused, JobEvent::Resume) => JobState::Running,

            (JobState::Running, JobEvent::Complete) => JobState::Completed,
            (JobState::Running, JobEvent::Fail(_)) => JobState::Failed,

            (JobState::Created, JobEvent::Cancel)
            | (JobState::Running, JobEvent::Cancel)
            | (JobState::Paused, JobEvent::Cancel) => JobState::Cancelled,

            (from_state, event) => {
                return Err(invalid_transition(from_state, event.event_type()));
            }
        };

        Ok(target)
    }

    pub fn apply(
        job: &mut Job,
        event: &JobEvent,
    ) -> StateMachineResult<AppliedTransition<JobState>> {
        let from = job.state;
        let to = Self::determine_target_state(from, event)?;

        match event {
            JobEvent::Start => job.started_at = Some(Utc::now()),
            JobEvent::Fail(reason) => job.error = Some(reason.clone()),
            _ => {}
        }
        if to.is_terminal() {
            job.completed_at = Some(Utc::now());
        }

        job.state = to;
        job.updated_at = Utc::now();
        Ok(AppliedTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_resume() {
        assert_eq!(
            JobStateMachine::determine_target_state(JobState::Running, &JobEvent::Pause).unwrap(),
            JobState::Paused
        );
        assert_eq!(
            JobStateMachine::determine_target_state(JobState::Paused, &JobEvent::Resume).unwrap(),
            JobState::Running
        );
    }

    #[test]
    fn test_terminal_states_reject_events() {
        for state in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            assert!(JobStateMachine::determine_target_state(state, &JobEvent::Start).is_err());
            assert!(JobStateMachine::determine_target_state(state, &JobEvent::Cancel).is_err());
        }
    }

    #[test]
    fn test_completion_requires_running() {
        assert!(
            JobStateMachine::determine_target_state(JobState::Paused, &JobEvent::Complete).is_err()
        );
        assert!(
            JobStateMachine::determine_target_state(JobState::Created, &JobEvent::Complete)
                .is_err()
        );
    }
}
