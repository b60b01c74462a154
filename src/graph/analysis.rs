//! Migration plan analysis over a dependency graph.
//!
//! Produces the creation order, dependency waves, cycle report and a coarse risk
//! assessment that operators review before starting a job.

use super::{CycleBreakSuggestion, DependencyEdge, DependencyGraph};
use crate::models::{Complexity, QualifiedName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Object count above which migrating in batches is recommended
pub const BATCHED_STRATEGY_THRESHOLD: usize = 100;

/// Average edges per object above which the risk level is raised
pub const HIGH_DEPENDENCY_RATIO: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStrategy {
    Sequential,
    Batched,
}

impl fmt::Display for MigrationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Batched => write!(f, "batched"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecommendations {
    pub strategy: MigrationStrategy,
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub complexity_breakdown: BTreeMap<Complexity, usize>,
}

impl MigrationRecommendations {
    pub fn assess(graph: &DependencyGraph, has_cycles: bool) -> Self {
        let objects = graph.nodes().filter(|n| !n.is_placeholder()).count();
        let edges = graph.edge_count();

        let mut recommendations = Self {
            strategy: MigrationStrategy::Sequential,
            risk_level: RiskLevel::Low,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            complexity_breakdown: BTreeMap::new(),
        };

        for node in graph.nodes().filter(|n| !n.is_placeholder()) {
            *recommendations
                .complexity_breakdown
                .entry(node.complexity)
                .or_default() += 1;
        }

        if has_cycles {
            recommendations.risk_level = RiskLevel::High;
            recommendations.warnings.push(
                "Circular dependencies detected. Manual intervention may be required.".into(),
            );
            recommendations.suggestions.push(
                "Break circular dependencies by creating objects without constraints first, \
                 then adding constraints in a second pass."
                    .into(),
            );
        }

        if objects > BATCHED_STRATEGY_THRESHOLD {
            recommendations.strategy = MigrationStrategy::Batched;
            recommendations.suggestions.push(format!(
                "Large number of objects ({objects}). Migrate in batches to manage risk."
            ));
        }

        if edges > objects * HIGH_DEPENDENCY_RATIO {
            recommendations.risk_level = recommendations.risk_level.raised();
            recommendations
                .warnings
                .push("High dependency ratio detected. Migration may be complex.".into());
        }

        let placeholders = graph.nodes().filter(|n| n.is_placeholder()).count();
        if placeholders > 0 {
            recommendations.warnings.push(format!(
                "{placeholders} referenced object(s) are outside the selection and must already exist on the target."
            ));
        }

        recommendations
    }
}

/// Read-only migration plan for a set of objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Creation order; empty when unresolved cycles remain
    pub order: Vec<QualifiedName>,
    pub levels: Vec<Vec<QualifiedName>>,
    pub cycles: Vec<Vec<QualifiedName>>,
    pub break_suggestions: Vec<CycleBreakSuggestion>,
    /// Edges removed when cycles were broken automatically
    pub deferred_edges: Vec<DependencyEdge>,
    pub object_count: usize,
    pub edge_count: usize,
    pub recommendations: MigrationRecommendations,
}

impl MigrationPlan {
    /// Analyse the graph, breaking cycles first when `auto_break` is set
    pub fn analyse(mut graph: DependencyGraph, auto_break: bool) -> Self {
        let cycles = graph.detect_cycles();
        let break_suggestions = graph.suggest_breaks();
        let recommendations = MigrationRecommendations::assess(&graph, !cycles.is_empty());

        let deferred_edges = if auto_break && !cycles.is_empty() {
            graph.break_cycles()
        } else {
            Vec::new()
        };

        let order = graph.topological_order().unwrap_or_default();
        let levels = graph.dependency_levels().unwrap_or_default();

        Self {
            order,
            levels,
            cycles,
            break_suggestions,
            deferred_edges,
            object_count: graph.node_count(),
            edge_count: graph.edge_count(),
            recommendations,
        }
    }

    pub fn is_executable(&self) -> bool {
        !self.order.is_empty() || self.object_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatabaseObject, ObjectKind};

    fn add_table(graph: &mut DependencyGraph, n: &str) -> QualifiedName {
        let name = QualifiedName::new("app", n);
        graph
            .add_object(DatabaseObject::new(
                name.clone(),
                ObjectKind::Table,
                "",
                Complexity::Simple,
            ))
            .unwrap();
        name
    }

    #[test]
    fn test_low_risk_sequential_plan() {
        let mut graph = DependencyGraph::new();
        let a = add_table(&mut graph, "a");
        let b = add_table(&mut graph, "b");
        graph.add_dependency(&b, &a).unwrap();

        let plan = MigrationPlan::analyse(graph, false);
        assert_eq!(plan.order, vec![a, b]);
        assert_eq!(plan.levels.len(), 2);
        assert_eq!(plan.recommendations.strategy, MigrationStrategy::Sequential);
        assert_eq!(plan.recommendations.risk_level, RiskLevel::Low);
        assert_eq!(
            plan.recommendations.complexity_breakdown.get(&Complexity::Simple),
            Some(&2)
        );
    }

    #[test]
    fn test_cycles_raise_risk_and_block_order() {
        let mut graph = DependencyGraph::new();
        let a = add_table(&mut graph, "a");
        let b = add_table(&mut graph, "b");
        graph.add_dependency(&a, &b).unwrap();
        graph.add_dependency(&b, &a).unwrap();

        let blocked = MigrationPlan::analyse(graph.clone(), false);
        assert_eq!(blocked.recommendations.risk_level, RiskLevel::High);
        assert!(blocked.order.is_empty());
        assert!(!blocked.is_executable());
        assert_eq!(blocked.break_suggestions.len(), 1);

        let broken = MigrationPlan::analyse(graph, true);
        assert_eq!(broken.deferred_edges.len(), 1);
        assert_eq!(broken.order.len(), 2);
        assert_eq!(broken.cycles.len(), 1);
    }

    #[test]
    fn test_batched_strategy_for_large_graphs() {
        let mut graph = DependencyGraph::new();
        for i in 0..=BATCHED_STRATEGY_THRESHOLD {
            add_table(&mut graph, &format!("t{i:03}"));
        }
        let plan = MigrationPlan::analyse(graph, false);
        assert_eq!(plan.recommendations.strategy, MigrationStrategy::Batched);
    }

    #[test]
    fn test_dense_graph_raises_risk() {
        let mut graph = DependencyGraph::new();
        let names: Vec<_> = ["a", "b", "c"].iter().map(|n| add_table(&mut graph, n)).collect();
        // 3 objects, 7 edges (4 onto placeholders)
        graph.add_dependency(&names[1], &names[0]).unwrap();
        graph.add_dependency(&names[2], &names[0]).unwrap();
        graph.add_dependency(&names[2], &names[1]).unwrap();
        for ext in ["x1", "x2", "x3", "x4"] {
            graph
                .add_dependency(&names[2], &QualifiedName::new("ext", ext))
                .unwrap();
        }
        let plan = MigrationPlan::analyse(graph, false);
        assert_eq!(plan.recommendations.risk_level, RiskLevel::Medium);
        assert_eq!(plan.recommendations.warnings.len(), 2);
    }
}
