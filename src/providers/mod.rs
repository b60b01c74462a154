//! # External Collaborators
//!
//! Contracts for the systems the orchestration core drives but does not implement.
//!
//! ## Overview
//!
//! ```text
//! JobCoordinator ──→ ProviderRegistry ──┬─→ DiscoveryProvider   (source metadata + DDL)
//!                                       ├─→ ConversionProvider  (AI conversion call)
//!                                       ├─→ ExecutionProvider   (scratch + target execution)
//!                                       └─→ HistoryStore        (append-only attempt log)
//! ```
//!
//! All providers are `Send + Sync` and are invoked concurrently from step workers.
//! Failures are reported as `ProviderError`, whose variants drive retry classification.

pub mod history;
pub mod registry;

use crate::errors::ProviderResult;
use crate::models::{
    ConversionAttempt, DatabaseObject, NewConversionAttempt, ObjectKind, ObjectShape,
    QualifiedName,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use history::InMemoryHistoryStore;
pub use registry::ProviderRegistry;

/// Source-side metadata access
#[async_trait]
pub trait DiscoveryProvider: Send + Sync + 'static {
    /// List objects, optionally restricted to one schema
    async fn list_objects(
        &self,
        schema_filter: Option<&str>,
    ) -> ProviderResult<Vec<DatabaseObject>>;

    /// Current creation statement of an object
    async fn get_definition(&self, object: &QualifiedName) -> ProviderResult<String>;

    /// Objects this object depends on
    async fn list_references(&self, object: &QualifiedName) -> ProviderResult<Vec<QualifiedName>>;

    /// Declared columns and constraints, when the source can describe them
    async fn describe_shape(&self, _object: &QualifiedName) -> ProviderResult<Option<ObjectShape>> {
        Ok(None)
    }
}

/// Everything handed to the conversion provider for one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub object: QualifiedName,
    pub kind: ObjectKind,
    pub source_definition: String,
    /// Prior attempts for this object, most recent first
    pub history: Vec<ConversionAttempt>,
    /// Caller guidance plus any validation feedback from a rejected candidate
    pub guidance: Option<String>,
}

/// AI-assisted definition conversion
#[async_trait]
pub trait ConversionProvider: Send + Sync + 'static {
    /// Produce a candidate target definition
    async fn convert(&self, request: &ConversionRequest) -> ProviderResult<String>;
}

/// Where a candidate definition is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionTarget {
    /// Disposable validation target
    Scratch,
    /// The real migration target
    Primary,
}

impl fmt::Display for ExecutionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scratch => write!(f, "scratch"),
            Self::Primary => write!(f, "primary"),
        }
    }
}

/// Result of executing a definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Shape of the created object, when the target can report it
    pub shape: Option<ObjectShape>,
}

impl ExecutionOutcome {
    pub fn with_shape(shape: ObjectShape) -> Self {
        Self { shape: Some(shape) }
    }
}

/// Target-side statement execution
#[async_trait]
pub trait ExecutionProvider: Send + Sync + 'static {
    async fn execute(
        &self,
        object: &QualifiedName,
        definition: &str,
        target: ExecutionTarget,
    ) -> ProviderResult<ExecutionOutcome>;

    /// Pre-flight check of a candidate against the primary target without applying it
    async fn validate(&self, _object: &QualifiedName, _definition: &str) -> ProviderResult<()> {
        Ok(())
    }
}

/// Append-only store of conversion attempts, safe for concurrent writers
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Up to `limit` attempts for the object, most recent first
    async fn get_attempts(
        &self,
        object: &QualifiedName,
        limit: usize,
    ) -> ProviderResult<Vec<ConversionAttempt>>;

    /// Append a record and return it with its assigned sequence number
    async fn append_attempt(
        &self,
        attempt: NewConversionAttempt,
    ) -> ProviderResult<ConversionAttempt>;
}
