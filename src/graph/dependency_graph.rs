//! # Dependency Graph
//!
//! Directed graph of schema objects and the dependencies between them.
//!
//! ## Overview
//!
//! Nodes are keyed by qualified name; an edge `(dependent, dependency)` states that the
//! dependency must exist on the target before the dependent can be created. The graph is
//! a pure data structure: no I/O, no interior mutability.
//!
//! ## Key Features
//!
//! - Deterministic topological order with a kind-rank then name tie-break
//! - Cycle detection through a depth-first search with an explicit recursion stack
//! - Advisory cycle-break suggestions driven by object complexity
//! - Dependency levels (waves) for planning and reporting

use crate::errors::{GraphError, GraphResult};
use crate::models::{Complexity, DatabaseObject, QualifiedName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

/// Ordered pair `(dependent, dependency)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: QualifiedName,
    pub dependency: QualifiedName,
}

impl DependencyEdge {
    pub fn new(dependent: QualifiedName, dependency: QualifiedName) -> Self {
        Self {
            dependent,
            dependency,
        }
    }
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.dependent, self.dependency)
    }
}

/// What to do with an edge whose endpoint is not a node in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingPolicy {
    /// Insert the missing endpoint as an `external` placeholder node
    #[default]
    Placeholder,
    /// Drop the edge with a warning
    Drop,
    /// Fail with `UnknownObject`
    Reject,
}

impl fmt::Display for DanglingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => write!(f, "placeholder"),
            Self::Drop => write!(f, "drop"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Caller policy applied by graph mutation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPolicy {
    pub dangling: DanglingPolicy,
    pub allow_replace: bool,
}

impl Default for GraphPolicy {
    fn default() -> Self {
        Self {
            dangling: DanglingPolicy::Placeholder,
            allow_replace: true,
        }
    }
}

/// Advisory proposal for breaking one detected cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleBreakSuggestion {
    pub cycle: Vec<QualifiedName>,
    /// Edge to defer; its dependent is the most complex object in the cycle
    pub edge: DependencyEdge,
    pub source_complexity: Complexity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<QualifiedName, DatabaseObject>,
    edges: BTreeSet<DependencyEdge>,
    policy: GraphPolicy,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: GraphPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> GraphPolicy {
        self.policy
    }

    /// Insert or replace a node by qualified name.
    ///
    /// Re-adding an identical object is a no-op. Replacing a placeholder is always allowed;
    /// replacing a discovered object fails with `DuplicateObject` when the policy disallows it.
    pub fn add_object(&mut self, object: DatabaseObject) -> GraphResult<()> {
        if let Some(existing) = self.nodes.get(&object.name) {
            if existing == &object {
                return Ok(());
            }
            if !existing.is_placeholder() && !self.policy.allow_replace {
                return Err(GraphError::DuplicateObject { name: object.name });
            }
            debug!(object = %object.name, "Replacing graph node");
        }
        self.nodes.insert(object.name.clone(), object);
        Ok(())
    }

    /// Insert an edge. Returns `false` when the edge already existed or was dropped.
    pub fn add_dependency(
        &mut self,
        dependent: &QualifiedName,
        dependency: &QualifiedName,
    ) -> GraphResult<bool> {
        if dependent == dependency {
            return Err(GraphError::SelfDependency {
                name: dependent.clone(),
            });
        }

        for endpoint in [dependent, dependency] {
            if self.nodes.contains_key(endpoint) {
                continue;
            }
            match self.policy.dangling {
                DanglingPolicy::Placeholder => {
                    debug!(object = %endpoint, "Inserting placeholder node");
                    self.nodes
                        .insert(endpoint.clone(), DatabaseObject::placeholder(endpoint.clone()));
                }
                DanglingPolicy::Drop => {
                    warn!(
                        dependent = %dependent,
                        dependency = %dependency,
                        missing = %endpoint,
                        "Dropping dependency on unknown object"
                    );
                    return Ok(false);
                }
                DanglingPolicy::Reject => {
                    return Err(GraphError::UnknownObject {
                        name: endpoint.clone(),
                        dependent: dependent.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Ok(self
            .edges
            .insert(DependencyEdge::new(dependent.clone(), dependency.clone())))
    }

    pub fn remove_edge(&mut self, dependent: &QualifiedName, dependency: &QualifiedName) -> bool {
        self.edges
            .remove(&DependencyEdge::new(dependent.clone(), dependency.clone()))
    }

    pub fn node(&self, name: &QualifiedName) -> Option<&DatabaseObject> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DatabaseObject> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of `name`, in name order
    pub fn dependencies_of(&self, name: &QualifiedName) -> Vec<&QualifiedName> {
        self.edges
            .iter()
            .filter(|e| &e.dependent == name)
            .map(|e| &e.dependency)
            .collect()
    }

    /// Objects that directly depend on `name`
    pub fn dependents_of(&self, name: &QualifiedName) -> Vec<&QualifiedName> {
        self.edges
            .iter()
            .filter(|e| &e.dependency == name)
            .map(|e| &e.dependent)
            .collect()
    }

    fn adjacency(&self) -> HashMap<&QualifiedName, Vec<&QualifiedName>> {
        let mut adjacency: HashMap<&QualifiedName, Vec<&QualifiedName>> =
            self.nodes.keys().map(|name| (name, Vec::new())).collect();
        // BTreeSet iteration keeps each adjacency list sorted
        for edge in &self.edges {
            adjacency
                .entry(&edge.dependent)
                .or_default()
                .push(&edge.dependency);
        }
        adjacency
    }

    fn sort_key<'a>(&'a self, name: &'a QualifiedName) -> (u8, &'a QualifiedName) {
        let rank = self.nodes.get(name).map_or(u8::MAX, |n| n.kind.rank());
        (rank, name)
    }

    /// Creation order: every dependency precedes its dependents.
    ///
    /// Among objects with no relative constraint, order is by kind rank
    /// (table < view < function < procedure < trigger < external) then by name.
    pub fn topological_order(&self) -> GraphResult<Vec<QualifiedName>> {
        let mut remaining: HashMap<&QualifiedName, usize> =
            self.nodes.keys().map(|name| (name, 0)).collect();
        let mut dependents: HashMap<&QualifiedName, Vec<&QualifiedName>> = HashMap::new();
        for edge in &self.edges {
            *remaining.entry(&edge.dependent).or_default() += 1;
            dependents
                .entry(&edge.dependency)
                .or_default()
                .push(&edge.dependent);
        }

        let mut ready: BTreeSet<(u8, &QualifiedName)> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&name, _)| self.sort_key(name))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(next) = ready.pop_first() {
            let (_, name) = next;
            order.push(name.clone());
            for &dependent in dependents.get(name).map_or(&[][..], Vec::as_slice) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(self.sort_key(dependent));
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            return Err(GraphError::CyclicDependency {
                cycles: self.detect_cycles(),
            });
        }
        Ok(order)
    }

    /// All cycles closed by a back edge during a depth-first search.
    ///
    /// Each cycle follows edge direction (dependent to dependency) and repeats its first
    /// node at the end, e.g. `[A, B, C, A]`. Independent cycles are reported separately;
    /// the same loop reached from different entry points is reported once.
    pub fn detect_cycles(&self) -> Vec<Vec<QualifiedName>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            OnStack,
            Done,
        }

        let adjacency = self.adjacency();
        let mut marks: HashMap<&QualifiedName, Mark> = HashMap::new();
        let mut seen: HashSet<Vec<QualifiedName>> = HashSet::new();
        let mut cycles = Vec::new();

        for root in self.nodes.keys() {
            if marks.contains_key(root) {
                continue;
            }

            // Explicit recursion stack: (node, index of next neighbour to visit)
            let mut stack: Vec<(&QualifiedName, usize)> = vec![(root, 0)];
            marks.insert(root, Mark::OnStack);

            while let Some(frame) = stack.last_mut() {
                let (node, cursor) = *frame;
                let neighbours = adjacency.get(node).map_or(&[][..], Vec::as_slice);

                let Some(&next) = neighbours.get(cursor) else {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;

                match marks.get(next) {
                    None => {
                        marks.insert(next, Mark::OnStack);
                        stack.push((next, 0));
                    }
                    Some(Mark::OnStack) => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut cycle: Vec<QualifiedName> =
                            stack[start..].iter().map(|(n, _)| (*n).clone()).collect();
                        if seen.insert(canonical_rotation(&cycle)) {
                            cycle.push(next.clone());
                            cycles.push(cycle);
                        }
                    }
                    Some(Mark::Done) => {}
                }
            }
        }

        cycles
    }

    pub fn has_cycles(&self) -> bool {
        self.topological_order().is_err()
    }

    /// For every detected cycle, propose the edge whose dependent has the highest
    /// complexity. Ties go to the edge that appears first in the cycle.
    pub fn suggest_breaks(&self) -> Vec<CycleBreakSuggestion> {
        self.detect_cycles()
            .into_iter()
            .filter_map(|cycle| {
                let mut best: Option<(Complexity, DependencyEdge)> = None;
                for pair in cycle.windows(2) {
                    let complexity = self
                        .nodes
                        .get(&pair[0])
                        .map(|n| n.complexity)
                        .unwrap_or_default();
                    if best.as_ref().map_or(true, |(c, _)| complexity > *c) {
                        best = Some((
                            complexity,
                            DependencyEdge::new(pair[0].clone(), pair[1].clone()),
                        ));
                    }
                }
                best.map(|(source_complexity, edge)| CycleBreakSuggestion {
                    cycle,
                    edge,
                    source_complexity,
                })
            })
            .collect()
    }

    /// Apply break suggestions until the graph is acyclic, returning the removed edges
    pub fn break_cycles(&mut self) -> Vec<DependencyEdge> {
        let mut removed = Vec::new();
        loop {
            let suggestions = self.suggest_breaks();
            if suggestions.is_empty() {
                break;
            }
            for suggestion in suggestions {
                if self.remove_edge(&suggestion.edge.dependent, &suggestion.edge.dependency) {
                    warn!(
                        edge = %suggestion.edge,
                        complexity = %suggestion.source_complexity,
                        "Deferring dependency edge to break cycle"
                    );
                    removed.push(suggestion.edge);
                }
            }
        }
        removed
    }

    /// Group objects into dependency levels: level 0 has no dependencies, level `n`
    /// depends only on objects in earlier levels. Each level is in creation order.
    pub fn dependency_levels(&self) -> GraphResult<Vec<Vec<QualifiedName>>> {
        let order = self.topological_order()?;
        let mut level_of: HashMap<&QualifiedName, usize> = HashMap::new();
        let mut levels: Vec<Vec<QualifiedName>> = Vec::new();

        for name in &order {
            let level = self
                .dependencies_of(name)
                .into_iter()
                .filter_map(|dep| level_of.get(dep))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level_of.insert(name, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.clone());
        }

        Ok(levels)
    }
}

fn canonical_rotation(cycle: &[QualifiedName]) -> Vec<QualifiedName> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map_or(0, |(i, _)| i);
    cycle[start..]
        .iter()
        .chain(cycle[..start].iter())
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectKind;

    fn name(n: &str) -> QualifiedName {
        QualifiedName::new("app", n)
    }

    fn object(n: &str, kind: ObjectKind, complexity: Complexity) -> DatabaseObject {
        DatabaseObject::new(name(n), kind, format!("-- {n}"), complexity)
    }

    fn table(n: &str) -> DatabaseObject {
        object(n, ObjectKind::Table, Complexity::Simple)
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let mut graph = DependencyGraph::new();
        graph.add_object(table("t1")).unwrap();
        graph.add_object(table("t2")).unwrap();
        graph.add_dependency(&name("t2"), &name("t1")).unwrap();

        assert_eq!(graph.topological_order().unwrap(), vec![name("t1"), name("t2")]);
    }

    #[test]
    fn test_kind_rank_tie_break() {
        let mut graph = DependencyGraph::new();
        graph
            .add_object(object("a_trigger", ObjectKind::Trigger, Complexity::Complex))
            .unwrap();
        graph
            .add_object(object("b_view", ObjectKind::View, Complexity::Moderate))
            .unwrap();
        graph.add_object(table("z_table")).unwrap();
        graph.add_object(table("c_table")).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(
            order,
            vec![name("c_table"), name("z_table"), name("b_view"), name("a_trigger")]
        );
    }

    #[test]
    fn test_three_node_cycle_reported_in_edge_order() {
        let mut graph = DependencyGraph::new();
        for n in ["a", "b", "c"] {
            graph.add_object(table(n)).unwrap();
        }
        graph.add_dependency(&name("a"), &name("b")).unwrap();
        graph.add_dependency(&name("b"), &name("c")).unwrap();
        graph.add_dependency(&name("c"), &name("a")).unwrap();

        let err = graph.topological_order().unwrap_err();
        assert_eq!(
            err.cycles(),
            &[vec![name("a"), name("b"), name("c"), name("a")]][..]
        );
    }

    #[test]
    fn test_independent_cycles_reported_separately() {
        let mut graph = DependencyGraph::new();
        for n in ["a", "b", "x", "y"] {
            graph.add_object(table(n)).unwrap();
        }
        graph.add_dependency(&name("a"), &name("b")).unwrap();
        graph.add_dependency(&name("b"), &name("a")).unwrap();
        graph.add_dependency(&name("x"), &name("y")).unwrap();
        graph.add_dependency(&name("y"), &name("x")).unwrap();

        let cycles = graph.detect_cycles();
        assert_eq!(cycles.len(), 2);
        assert!(cycles.iter().all(|c| c.len() == 3 && c.first() == c.last()));
    }

    #[test]
    fn test_self_edge_rejected_and_duplicates_collapsed() {
        let mut graph = DependencyGraph::new();
        graph.add_object(table("a")).unwrap();
        graph.add_object(table("b")).unwrap();

        assert!(matches!(
            graph.add_dependency(&name("a"), &name("a")),
            Err(GraphError::SelfDependency { .. })
        ));
        assert!(graph.add_dependency(&name("a"), &name("b")).unwrap());
        assert!(!graph.add_dependency(&name("a"), &name("b")).unwrap());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_dangling_policies() {
        let mut placeholder = DependencyGraph::new();
        placeholder.add_object(table("a")).unwrap();
        placeholder.add_dependency(&name("a"), &name("ghost")).unwrap();
        assert!(placeholder.node(&name("ghost")).unwrap().is_placeholder());
        assert_eq!(
            placeholder.topological_order().unwrap(),
            vec![name("ghost"), name("a")]
        );

        let mut drop = DependencyGraph::with_policy(GraphPolicy {
            dangling: DanglingPolicy::Drop,
            allow_replace: true,
        });
        drop.add_object(table("a")).unwrap();
        assert!(!drop.add_dependency(&name("a"), &name("ghost")).unwrap());
        assert_eq!(drop.edge_count(), 0);

        let mut reject = DependencyGraph::with_policy(GraphPolicy {
            dangling: DanglingPolicy::Reject,
            allow_replace: true,
        });
        reject.add_object(table("a")).unwrap();
        assert!(matches!(
            reject.add_dependency(&name("a"), &name("ghost")),
            Err(GraphError::UnknownObject { .. })
        ));
    }

    #[test]
    fn test_replace_policy() {
        let mut graph = DependencyGraph::with_policy(GraphPolicy {
            dangling: DanglingPolicy::Placeholder,
            allow_replace: false,
        });
        graph.add_object(table("a")).unwrap();
        graph.add_object(table("a")).unwrap();
        assert!(matches!(
            graph.add_object(object("a", ObjectKind::View, Complexity::Moderate)),
            Err(GraphError::DuplicateObject { .. })
        ));

        // Placeholders can always be resolved by the real object
        graph.add_dependency(&name("a"), &name("late")).unwrap();
        graph.add_object(table("late")).unwrap();
        assert!(!graph.node(&name("late")).unwrap().is_placeholder());
    }

    #[test]
    fn test_break_suggestion_prefers_complex_source() {
        let mut graph = DependencyGraph::new();
        graph.add_object(table("orders")).unwrap();
        graph
            .add_object(object("audit_proc", ObjectKind::Procedure, Complexity::VeryComplex))
            .unwrap();
        graph.add_dependency(&name("orders"), &name("audit_proc")).unwrap();
        graph.add_dependency(&name("audit_proc"), &name("orders")).unwrap();

        let suggestions = graph.suggest_breaks();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(
            suggestions[0].edge,
            DependencyEdge::new(name("audit_proc"), name("orders"))
        );

        let removed = graph.break_cycles();
        assert_eq!(removed.len(), 1);
        assert_eq!(
            graph.topological_order().unwrap(),
            vec![name("orders"), name("audit_proc")]
        );
    }

    #[test]
    fn test_dependency_levels() {
        let mut graph = DependencyGraph::new();
        for n in ["a", "b", "c", "d"] {
            graph.add_object(table(n)).unwrap();
        }
        graph.add_dependency(&name("c"), &name("a")).unwrap();
        graph.add_dependency(&name("c"), &name("b")).unwrap();
        graph.add_dependency(&name("d"), &name("c")).unwrap();

        let levels = graph.dependency_levels().unwrap();
        assert_eq!(
            levels,
            vec![vec![name("a"), name("b")], vec![name("c")], vec![name("d")]]
        );
    }
}
