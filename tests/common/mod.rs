#![allow(dead_code)]

pub mod providers;
pub mod strategies;

pub use providers::*;
pub use strategies::*;

use dbrefactor_core::config::MigrationConfig;
use dbrefactor_core::models::{Complexity, DatabaseObject, ObjectKind, QualifiedName};
use dbrefactor_core::orchestration::{JobCoordinator, OrchestrationEvent, StepTransitionEvent};
use dbrefactor_core::state_machine::{CheckpointStore, InMemoryCheckpointStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound for any single wait in these tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub fn qn(name: &str) -> QualifiedName {
    QualifiedName::new("app", name)
}

pub fn table(name: &str) -> DatabaseObject {
    DatabaseObject::new(
        qn(name),
        ObjectKind::Table,
        format!("CREATE TABLE {name} (id NUMBER NOT NULL)"),
        Complexity::Simple,
    )
}

pub fn view(name: &str) -> DatabaseObject {
    DatabaseObject::new(
        qn(name),
        ObjectKind::View,
        format!("CREATE VIEW {name} AS SELECT 1 FROM dual"),
        Complexity::Moderate,
    )
}

pub fn test_config() -> MigrationConfig {
    MigrationConfig::for_testing()
}

pub fn coordinator_with(
    config: MigrationConfig,
    providers: &TestProviders,
    checkpoints: Arc<InMemoryCheckpointStore>,
) -> JobCoordinator {
    let checkpoints: Arc<dyn CheckpointStore> = checkpoints;
    JobCoordinator::new(Arc::new(config), providers.registry(), checkpoints)
}

pub fn coordinator(providers: &TestProviders) -> JobCoordinator {
    coordinator_with(
        test_config(),
        providers,
        Arc::new(InMemoryCheckpointStore::new()),
    )
}

/// Step transitions received so far, without waiting
pub fn drain_step_events(
    receiver: &mut broadcast::Receiver<OrchestrationEvent>,
) -> Vec<StepTransitionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let OrchestrationEvent::StepTransition(event) = event {
            events.push(event);
        }
    }
    events
}

/// Wait for the first step transition matching the predicate
pub async fn wait_for_step_event<F>(
    receiver: &mut broadcast::Receiver<OrchestrationEvent>,
    mut predicate: F,
) -> StepTransitionEvent
where
    F: FnMut(&StepTransitionEvent) -> bool,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match receiver.recv().await {
                Ok(OrchestrationEvent::StepTransition(event)) if predicate(&event) => {
                    return event;
                }
                Ok(_) => continue,
                Err(err) => panic!("event channel failed: {err}"),
            }
        }
    })
    .await
    .expect("timed out waiting for step event")
}
