//! # Orchestration Event Publisher
//!
//! Push notifications for job and step state transitions.
//!
//! ## Overview
//!
//! The workflow engine publishes one event per applied transition on a
//! `tokio::sync::broadcast` channel. Subscribers see events from the moment they
//! subscribe; history is not replayed. A subscriber that falls behind the channel buffer
//! skips the missed events with a warning instead of failing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dbrefactor_core::orchestration::event_publisher::EventPublisher;
//! use futures::StreamExt;
//! use uuid::Uuid;
//!
//! # async fn example(job_id: Uuid) {
//! let publisher = EventPublisher::new(1024);
//! let mut events = Box::pin(publisher.job_step_events(job_id));
//! while let Some(event) = events.next().await {
//!     println!("{} {} -> {}", event.step_id, event.from_status.map_or("-".into(), |s| s.to_string()), event.to_status);
//! }
//! # }
//! ```

use crate::models::{QualifiedName, StepId, StepKind};
use crate::state_machine::{JobState, StepState};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

/// A step moved from one status to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTransitionEvent {
    pub job_id: Uuid,
    pub object_name: QualifiedName,
    pub step_id: StepId,
    pub step_name: StepKind,
    pub from_status: Option<StepState>,
    pub to_status: StepState,
    pub attempt: u32,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A job moved through its lifecycle (started, paused, resumed, completed, failed, cancelled)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransitionEvent {
    pub job_id: Uuid,
    pub from_state: Option<JobState>,
    pub to_state: JobState,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    StepTransition(StepTransitionEvent),
    JobTransition(JobTransitionEvent),
}

impl OrchestrationEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            Self::StepTransition(event) => event.job_id,
            Self::JobTransition(event) => event.job_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<OrchestrationEvent>,
}

impl EventPublisher {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    /// Publish an event; returns the number of subscribers that received it
    pub fn publish(&self, event: OrchestrationEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Step transitions of one job, ending once the job reaches a terminal state
    pub fn job_step_events(
        &self,
        job_id: Uuid,
    ) -> impl Stream<Item = StepTransitionEvent> + Send + 'static {
        futures::stream::unfold(Some(self.subscribe()), move |receiver| async move {
            let mut receiver = receiver?;
            loop {
                match receiver.recv().await {
                    Ok(OrchestrationEvent::StepTransition(event)) if event.job_id == job_id => {
                        return Some((event, Some(receiver)));
                    }
                    Ok(OrchestrationEvent::JobTransition(event))
                        if event.job_id == job_id && event.to_state.is_terminal() =>
                    {
                        return None;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            job_id = %job_id,
                            skipped = skipped,
                            "Event subscriber lagged; skipping missed events"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn step_event(job_id: Uuid, to: StepState) -> OrchestrationEvent {
        OrchestrationEvent::StepTransition(StepTransitionEvent {
            job_id,
            object_name: QualifiedName::new("app", "t1"),
            step_id: StepId::from("app.t1::fetch"),
            step_name: StepKind::Fetch,
            from_status: Some(StepState::Ready),
            to_status: to,
            attempt: 1,
            reason: None,
            timestamp: Utc::now(),
        })
    }

    fn job_event(job_id: Uuid, to: JobState) -> OrchestrationEvent {
        OrchestrationEvent::JobTransition(JobTransitionEvent {
            job_id,
            from_state: Some(JobState::Running),
            to_state: to,
            reason: None,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new(4);
        assert_eq!(publisher.publish(job_event(Uuid::nil(), JobState::Running)), 0);
    }

    #[test]
    fn test_subscriber_count_tracks_receivers() {
        let publisher = EventPublisher::new(4);
        let first = publisher.subscribe();
        let _second = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        drop(first);
        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(publisher.publish(job_event(Uuid::nil(), JobState::Running)), 1);
    }

    #[tokio::test]
    async fn test_job_stream_filters_and_ends_on_terminal_state() {
        let publisher = EventPublisher::new(16);
        let job_id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let stream = publisher.job_step_events(job_id);

        publisher.publish(step_event(other, StepState::Running));
        publisher.publish(step_event(job_id, StepState::Running));
        publisher.publish(step_event(job_id, StepState::Succeeded));
        publisher.publish(job_event(other, JobState::Completed));
        publisher.publish(job_event(job_id, JobState::Completed));
        publisher.publish(step_event(job_id, StepState::Running));

        let events: Vec<StepTransitionEvent> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].to_status, StepState::Running);
        assert_eq!(events[1].to_status, StepState::Succeeded);
        assert!(events.iter().all(|e| e.job_id == job_id));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_missed_events() {
        let publisher = EventPublisher::new(2);
        let job_id = Uuid::new_v4();
        let stream = publisher.job_step_events(job_id);

        for _ in 0..5 {
            publisher.publish(step_event(job_id, StepState::Running));
        }
        publisher.publish(job_event(job_id, JobState::Failed));

        let events: Vec<StepTransitionEvent> = stream.collect().await;
        assert!(events.len() <= 2);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let value = serde_json::to_value(job_event(Uuid::nil(), JobState::Paused)).unwrap();
        assert_eq!(value["type"], "job_transition");
        assert_eq!(value["data"]["to_state"], "paused");
    }
}
