//! # Dependency Graph
//!
//! Object dependency modelling, ordering and plan analysis.

pub mod analysis;
pub mod dependency_graph;

pub use analysis::{MigrationPlan, MigrationRecommendations, MigrationStrategy, RiskLevel};
pub use dependency_graph::{
    CycleBreakSuggestion, DanglingPolicy, DependencyEdge, DependencyGraph, GraphPolicy,
};
