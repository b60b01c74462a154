use super::{ConversionProvider, DiscoveryProvider, ExecutionProvider, HistoryStore};
use std::fmt;
use std::sync::Arc;

/// Explicit set of collaborators, constructed once per process and handed to the
/// job coordinator by value.
#[derive(Clone)]
pub struct ProviderRegistry {
    discovery: Arc<dyn DiscoveryProvider>,
    conversion: Arc<dyn ConversionProvider>,
    execution: Arc<dyn ExecutionProvider>,
    history: Arc<dyn HistoryStore>,
}

impl ProviderRegistry {
    pub fn new(
        discovery: Arc<dyn DiscoveryProvider>,
        conversion: Arc<dyn ConversionProvider>,
        execution: Arc<dyn ExecutionProvider>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            discovery,
            conversion,
            execution,
            history,
        }
    }

    pub fn discovery(&self) -> &Arc<dyn DiscoveryProvider> {
        &self.discovery
    }

    pub fn conversion(&self) -> &Arc<dyn ConversionProvider> {
        &self.conversion
    }

    pub fn execution(&self) -> &Arc<dyn ExecutionProvider> {
        &self.execution
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}
