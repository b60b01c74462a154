use super::HistoryStore;
use crate::errors::ProviderResult;
use crate::models::{ConversionAttempt, NewConversionAttempt, QualifiedName};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

/// In-process conversion history.
///
/// Appends for one object serialize on that object's map shard, so sequence numbers are
/// gap-free per object while different objects append concurrently.
///
/// ```rust
/// use dbrefactor_core::models::{NewConversionAttempt, QualifiedName};
/// use dbrefactor_core::providers::{HistoryStore, InMemoryHistoryStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryHistoryStore::new();
/// let orders = QualifiedName::new("sales", "orders");
/// store
///     .append_attempt(NewConversionAttempt::incomplete(orders.clone(), "abc123"))
///     .await
///     .unwrap();
///
/// let recent = store.get_attempts(&orders, 5).await.unwrap();
/// assert_eq!(recent[0].sequence, 1);
/// assert!(!recent[0].is_success());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    attempts: DashMap<QualifiedName, Vec<ConversionAttempt>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt for the object in append order
    pub fn all_attempts(&self, object: &QualifiedName) -> Vec<ConversionAttempt> {
        self.attempts
            .get(object)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_attempts(
        &self,
        object: &QualifiedName,
        limit: usize,
    ) -> ProviderResult<Vec<ConversionAttempt>> {
        Ok(self
            .attempts
            .get(object)
            .map(|entry| entry.value().iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_attempt(
        &self,
        attempt: NewConversionAttempt,
    ) -> ProviderResult<ConversionAttempt> {
        let mut entry = self.attempts.entry(attempt.object.clone()).or_default();
        let sequence = u32::try_from(entry.len()).unwrap_or(u32::MAX).saturating_add(1);
        let stored = attempt.into_attempt(sequence, Utc::now());
        entry.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttemptOutcome;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_most_recent_first_with_limit() {
        let store = InMemoryHistoryStore::new();
        let object = QualifiedName::new("app", "orders");
        for i in 0..4 {
            store
                .append_attempt(NewConversionAttempt::failure(
                    object.clone(),
                    "hash",
                    None,
                    format!("failure {i}"),
                ))
                .await
                .unwrap();
        }
        store
            .append_attempt(NewConversionAttempt::success(object.clone(), "hash", "CREATE"))
            .await
            .unwrap();

        let recent = store.get_attempts(&object, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sequence, 5);
        assert_eq!(recent[0].outcome, AttemptOutcome::Success);
        assert_eq!(recent[1].sequence, 4);
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_unique_sequences() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let object = QualifiedName::new("app", "orders");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let object = object.clone();
                tokio::spawn(async move {
                    store
                        .append_attempt(NewConversionAttempt::incomplete(object, "hash"))
                        .await
                        .unwrap()
                        .sequence
                })
            })
            .collect();

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap());
        }
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=16).collect::<Vec<u32>>());
        assert_eq!(store.total_attempts(), 16);
    }
}
