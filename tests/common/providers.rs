//! Scripted in-memory providers for integration tests

use async_trait::async_trait;
use dbrefactor_core::errors::{ProviderError, ProviderResult};
use dbrefactor_core::models::{DatabaseObject, QualifiedName};
use dbrefactor_core::providers::{
    ConversionProvider, ConversionRequest, DiscoveryProvider, ExecutionOutcome,
    ExecutionProvider, ExecutionTarget, InMemoryHistoryStore, ProviderRegistry,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Marker that makes a candidate fail scratch execution
pub const BROKEN_CANDIDATE: &str = "/* broken */";

pub fn converted(source: &str) -> String {
    format!("{source} /* converted */")
}

#[derive(Debug, Default)]
pub struct FakeDiscovery {
    objects: Mutex<Vec<DatabaseObject>>,
    references: Mutex<HashMap<QualifiedName, Vec<QualifiedName>>>,
    definition_calls: AtomicUsize,
}

impl FakeDiscovery {
    pub fn add(&self, object: DatabaseObject, references: Vec<QualifiedName>) {
        self.references.lock().insert(object.name.clone(), references);
        self.objects.lock().push(object);
    }

    pub fn definition_calls(&self) -> usize {
        self.definition_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryProvider for FakeDiscovery {
    async fn list_objects(
        &self,
        schema_filter: Option<&str>,
    ) -> ProviderResult<Vec<DatabaseObject>> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| schema_filter.map_or(true, |s| o.name.schema().eq_ignore_ascii_case(s)))
            .cloned()
            .collect())
    }

    async fn get_definition(&self, object: &QualifiedName) -> ProviderResult<String> {
        self.definition_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .iter()
            .find(|o| &o.name == object)
            .map(|o| o.definition.clone())
            .ok_or_else(|| ProviderError::NotFound(object.to_string()))
    }

    async fn list_references(&self, object: &QualifiedName) -> ProviderResult<Vec<QualifiedName>> {
        Ok(self
            .references
            .lock()
            .get(object)
            .cloned()
            .unwrap_or_default())
    }
}

/// Returns scripted results per object in order, then a plain conversion
#[derive(Debug, Default)]
pub struct ScriptedConversion {
    scripts: Mutex<HashMap<QualifiedName, VecDeque<ProviderResult<String>>>>,
    /// Calls allowed per object before the rest hang
    hanging: Mutex<HashMap<QualifiedName, usize>>,
    requests: Mutex<Vec<ConversionRequest>>,
}

impl ScriptedConversion {
    pub fn script(&self, object: QualifiedName, results: Vec<ProviderResult<String>>) {
        self.scripts.lock().insert(object, results.into());
    }

    /// Calls for this object never return
    pub fn hang(&self, object: QualifiedName) {
        self.hang_after(object, 0);
    }

    /// Calls for this object after the first `calls` never return
    pub fn hang_after(&self, object: QualifiedName, calls: usize) {
        self.hanging.lock().insert(object, calls);
    }

    pub fn requests_for(&self, object: &QualifiedName) -> Vec<ConversionRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| &r.object == object)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl ConversionProvider for ScriptedConversion {
    async fn convert(&self, request: &ConversionRequest) -> ProviderResult<String> {
        let seen = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.iter().filter(|r| r.object == request.object).count()
        };

        let hang = self
            .hanging
            .lock()
            .get(&request.object)
            .is_some_and(|allowed| seen > *allowed);
        if hang {
            std::future::pending::<()>().await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&request.object)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(converted(&request.source_definition)))
    }
}

#[derive(Debug, Default)]
pub struct RecordingExecution {
    delay: Mutex<Duration>,
    primary_failures: Mutex<HashMap<QualifiedName, ProviderError>>,
    hanging_primary: Mutex<HashSet<QualifiedName>>,
    primary: Mutex<Vec<QualifiedName>>,
    scratch_calls: AtomicUsize,
}

impl RecordingExecution {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail_primary(&self, object: QualifiedName, error: ProviderError) {
        self.primary_failures.lock().insert(object, error);
    }

    pub fn hang_primary(&self, object: QualifiedName) {
        self.hanging_primary.lock().insert(object);
    }

    pub fn primary_executions(&self, object: &QualifiedName) -> usize {
        self.primary.lock().iter().filter(|o| *o == object).count()
    }

    pub fn primary_order(&self) -> Vec<QualifiedName> {
        self.primary.lock().clone()
    }

    pub fn scratch_calls(&self) -> usize {
        self.scratch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionProvider for RecordingExecution {
    async fn execute(
        &self,
        object: &QualifiedName,
        definition: &str,
        target: ExecutionTarget,
    ) -> ProviderResult<ExecutionOutcome> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match target {
            ExecutionTarget::Scratch => {
                self.scratch_calls.fetch_add(1, Ordering::SeqCst);
                if definition.contains(BROKEN_CANDIDATE) {
                    return Err(ProviderError::Execution(
                        "ORA-00904: invalid identifier".to_string(),
                    ));
                }
                Ok(ExecutionOutcome::default())
            }
            ExecutionTarget::Primary => {
                let hang = self.hanging_primary.lock().contains(object);
                if hang {
                    std::future::pending::<()>().await;
                }
                let failure = self.primary_failures.lock().get(object).cloned();
                if let Some(error) = failure {
                    return Err(error);
                }
                self.primary.lock().push(object.clone());
                Ok(ExecutionOutcome::default())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestProviders {
    pub discovery: Arc<FakeDiscovery>,
    pub conversion: Arc<ScriptedConversion>,
    pub execution: Arc<RecordingExecution>,
    pub history: Arc<InMemoryHistoryStore>,
}

impl TestProviders {
    pub fn new() -> Self {
        Self::with_history(Arc::new(InMemoryHistoryStore::new()))
    }

    /// Fresh providers over an existing conversion history
    pub fn with_history(history: Arc<InMemoryHistoryStore>) -> Self {
        Self {
            discovery: Arc::new(FakeDiscovery::default()),
            conversion: Arc::new(ScriptedConversion::default()),
            execution: Arc::new(RecordingExecution::default()),
            history,
        }
    }

    /// Register an object and the names (in schema `app`) it references
    pub fn object(self, object: DatabaseObject, references: &[&str]) -> Self {
        self.discovery.add(
            object,
            references.iter().map(|r| super::qn(r)).collect(),
        );
        self
    }

    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::new(
            self.discovery.clone(),
            self.conversion.clone(),
            self.execution.clone(),
            self.history.clone(),
        )
    }
}

impl Default for TestProviders {
    fn default() -> Self {
        Self::new()
    }
}
