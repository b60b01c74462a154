mod common;

use common::*;
use dbrefactor_core::catalog::ObjectCatalog;
use dbrefactor_core::errors::GraphError;
use dbrefactor_core::graph::{DependencyGraph, GraphPolicy, MigrationPlan};
use dbrefactor_core::models::{Complexity, DatabaseObject, ObjectKind, QualifiedName};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

fn graph_from(nodes: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..nodes {
        graph.add_object(table(&node_name(i))).unwrap();
    }
    for (dependent, dependency) in edges {
        graph
            .add_dependency(&qn(&node_name(*dependent)), &qn(&node_name(*dependency)))
            .unwrap();
    }
    graph
}

proptest! {
    /// Property: every dependency precedes its dependents in the creation order
    #[test]
    fn topological_order_respects_every_edge((nodes, edges) in dag_strategy()) {
        let graph = graph_from(nodes, &edges);
        let order = graph.topological_order().unwrap();

        prop_assert_eq!(order.len(), nodes);
        let position: HashMap<&QualifiedName, usize> =
            order.iter().enumerate().map(|(i, n)| (n, i)).collect();
        for edge in graph.edges() {
            prop_assert!(
                position[&edge.dependency] < position[&edge.dependent],
                "{} out of order",
                edge
            );
        }
    }

    /// Property: ordering is deterministic for the same graph
    #[test]
    fn topological_order_is_deterministic((nodes, edges) in dag_strategy()) {
        let first = graph_from(nodes, &edges).topological_order().unwrap();
        let mut reversed = edges.clone();
        reversed.reverse();
        let second = graph_from(nodes, &reversed).topological_order().unwrap();
        prop_assert_eq!(first, second);
    }

    /// Property: dependency waves partition the DAG and respect its edges
    #[test]
    fn dependency_levels_partition_nodes((nodes, edges) in dag_strategy()) {
        let graph = graph_from(nodes, &edges);
        let levels = graph.dependency_levels().unwrap();

        let level_of: HashMap<&QualifiedName, usize> = levels
            .iter()
            .enumerate()
            .flat_map(|(level, names)| names.iter().map(move |n| (n, level)))
            .collect();
        prop_assert_eq!(level_of.len(), nodes);
        for edge in graph.edges() {
            prop_assert!(level_of[&edge.dependency] < level_of[&edge.dependent]);
        }
    }

    /// Property: closing a chain into a loop makes ordering fail and reports that loop
    #[test]
    fn closed_chain_is_reported_as_one_cycle(length in cycle_length_strategy()) {
        let mut edges: Vec<(usize, usize)> = (0..length - 1).map(|i| (i, i + 1)).collect();
        edges.push((length - 1, 0));
        let graph = graph_from(length, &edges);

        let err = graph.topological_order().unwrap_err();
        prop_assert!(matches!(err, GraphError::CyclicDependency { .. }), "expected CyclicDependency, got {:?}", err);

        let cycles = graph.detect_cycles();
        prop_assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        prop_assert_eq!(cycle.len(), length + 1);
        prop_assert_eq!(cycle.first(), cycle.last());
        let members: BTreeSet<&QualifiedName> = cycle.iter().collect();
        prop_assert_eq!(members.len(), length);
    }
}

#[test]
fn scenario_dependency_created_first() {
    let mut graph = DependencyGraph::new();
    graph.add_object(table("t1")).unwrap();
    graph.add_object(table("t2")).unwrap();
    graph.add_dependency(&qn("t2"), &qn("t1")).unwrap();

    assert_eq!(graph.topological_order().unwrap(), vec![qn("t1"), qn("t2")]);
}

#[test]
fn scenario_three_object_cycle() {
    let mut graph = DependencyGraph::new();
    for name in ["a", "b", "c"] {
        graph.add_object(table(name)).unwrap();
    }
    graph.add_dependency(&qn("a"), &qn("b")).unwrap();
    graph.add_dependency(&qn("b"), &qn("c")).unwrap();
    graph.add_dependency(&qn("c"), &qn("a")).unwrap();

    match graph.topological_order() {
        Err(GraphError::CyclicDependency { cycles }) => {
            assert_eq!(cycles, vec![vec![qn("a"), qn("b"), qn("c"), qn("a")]]);
        }
        other => panic!("expected cyclic dependency error, got {other:?}"),
    }
}

#[test]
fn adding_identical_object_twice_is_idempotent() {
    let mut once = DependencyGraph::new();
    once.add_object(table("t1")).unwrap();
    once.add_object(view("v1")).unwrap();
    once.add_dependency(&qn("v1"), &qn("t1")).unwrap();

    let mut twice = once.clone();
    twice.add_object(table("t1")).unwrap();
    twice.add_dependency(&qn("v1"), &qn("t1")).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn catalog_replacement_keeps_single_entry() {
    let mut catalog = ObjectCatalog::new();
    catalog.add_with_references(view("v1"), vec![qn("t1")]);
    catalog.add(table("t1"));
    let replaced = catalog.add_with_references(view("v1"), vec![qn("t1")]);

    assert!(replaced.is_some());
    assert_eq!(catalog.len(), 2);
    let graph = catalog.build(GraphPolicy::default()).unwrap();
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn plan_breaks_cycle_at_most_complex_object() {
    let mut graph = DependencyGraph::new();
    graph.add_object(table("orders")).unwrap();
    graph
        .add_object(DatabaseObject::new(
            qn("recalc"),
            ObjectKind::Procedure,
            "CREATE PROCEDURE recalc AS BEGIN NULL; END;",
            Complexity::VeryComplex,
        ))
        .unwrap();
    graph.add_dependency(&qn("orders"), &qn("recalc")).unwrap();
    graph.add_dependency(&qn("recalc"), &qn("orders")).unwrap();

    let advisory = MigrationPlan::analyse(graph.clone(), false);
    assert!(advisory.order.is_empty());
    assert!(!advisory.is_executable());
    assert_eq!(advisory.break_suggestions.len(), 1);
    assert_eq!(advisory.break_suggestions[0].edge.dependent, qn("recalc"));

    let applied = MigrationPlan::analyse(graph, true);
    assert!(applied.is_executable());
    assert_eq!(applied.deferred_edges.len(), 1);
    assert_eq!(applied.order, vec![qn("recalc"), qn("orders")]);
}
