#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DBRefactor Core
//!
//! Dependency resolution and workflow orchestration for AI-assisted database schema
//! migration.
//!
//! ## Overview
//!
//! A migration job moves a set of database objects (tables, views, functions,
//! procedures, triggers) from a source system to a target system. Objects depend on each
//! other, so they must be created in dependency order; each object's definition is
//! rewritten by an external conversion provider, proven against a scratch target, then
//! applied. This crate owns the parts in between:
//!
//! - building and ordering the dependency graph, detecting and optionally breaking cycles
//! - scheduling each object's phase chain as a wave-based workflow with bounded concurrency
//! - classifying failures into retries, re-conversions and permanent failures
//! - checkpointing every transition so interrupted jobs resume where they stopped
//!
//! The conversion, discovery, execution and history collaborators are traits in
//! [`providers`]; this crate ships no model client or database driver for them.
//!
//! ## Module Organization
//!
//! - [`models`] - objects, conversion attempts, workflow steps and jobs
//! - [`graph`] - dependency graph, cycle handling and migration plans
//! - [`catalog`] - staging area between discovery and graph building
//! - [`state_machine`] - job and step lifecycles plus checkpoint persistence
//! - [`providers`] - external collaborator traits and the provider registry
//! - [`orchestration`] - coordinator, engine, executor and events
//! - [`config`] - layered configuration
//! - [`logging`] - tracing initialisation and structured logging macros
//! - [`errors`] - error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbrefactor_core::config::ConfigManager;
//! use dbrefactor_core::models::{JobOptions, ObjectSelector};
//! use dbrefactor_core::orchestration::JobCoordinator;
//! use dbrefactor_core::providers::ProviderRegistry;
//! use std::sync::Arc;
//!
//! # async fn example(registry: ProviderRegistry) -> Result<(), Box<dyn std::error::Error>> {
//! dbrefactor_core::logging::init_tracing();
//! let manager = ConfigManager::load()?;
//! let coordinator = JobCoordinator::in_memory(Arc::new(manager.config().clone()), registry);
//!
//! let job_id = coordinator
//!     .start_job(ObjectSelector::schema("sales"), JobOptions::default())
//!     .await?;
//! let status = coordinator.wait_for_completion(job_id).await?;
//! println!("{job_id}: {} ({} succeeded)", status.state, status.counts.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod providers;
pub mod state_machine;

pub use catalog::{CatalogEntry, ObjectCatalog};
pub use config::{ConfigManager, MigrationConfig};
pub use errors::{
    DbRefactorError, DbRefactorResult, GraphError, OrchestrationError, ProviderError,
};
pub use graph::{DependencyEdge, DependencyGraph, MigrationPlan};
pub use models::{
    DatabaseObject, Job, JobOptions, JobStatus, ObjectKind, ObjectSelector, QualifiedName,
};
pub use orchestration::{JobCoordinator, OrchestrationEvent, StepTransitionEvent};
pub use providers::ProviderRegistry;
pub use state_machine::{CheckpointStore, InMemoryCheckpointStore, JobState, StepState};
