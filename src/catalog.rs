//! # Object Catalog
//!
//! Staging area for discovered objects before the dependency graph is built.
//!
//! ## Overview
//!
//! The catalog holds at most one entry per qualified name. Objects arrive one at a time
//! or in bulk, each with the list of objects it references; re-inserting a name replaces
//! the earlier entry and logs the replacement. `build()` turns the staged entries into a
//! `DependencyGraph` under the caller's graph policy.

use crate::errors::{GraphResult, ProviderError, ProviderResult};
use crate::graph::{DependencyGraph, GraphPolicy};
use crate::models::{Complexity, DatabaseObject, JobOptions, ObjectSelector, QualifiedName};
use crate::providers::DiscoveryProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// One staged object and the objects it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub object: DatabaseObject,
    #[serde(default)]
    pub references: Vec<QualifiedName>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectCatalog {
    entries: BTreeMap<QualifiedName, CatalogEntry>,
}

impl ObjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an object without references; returns the entry it replaced, if any
    pub fn add(&mut self, object: DatabaseObject) -> Option<CatalogEntry> {
        self.add_with_references(object, Vec::new())
    }

    pub fn add_with_references(
        &mut self,
        object: DatabaseObject,
        references: Vec<QualifiedName>,
    ) -> Option<CatalogEntry> {
        let name = object.name.clone();
        let replaced = self.entries.insert(
            name.clone(),
            CatalogEntry {
                object,
                references,
            },
        );
        if replaced.is_some() {
            crate::log_graph!(info, "catalog_object_replaced", object: name.to_string());
        }
        replaced
    }

    /// Stage many entries at once; returns how many replaced an earlier entry
    pub fn bulk_load(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) -> usize {
        entries
            .into_iter()
            .filter_map(|entry| self.add_with_references(entry.object, entry.references))
            .count()
    }

    /// Replace the reference list of a staged object; returns false for unknown names
    pub fn set_references(&mut self, name: &QualifiedName, references: Vec<QualifiedName>) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.references = references;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &QualifiedName> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a dependency graph from the staged entries.
    ///
    /// Self references (e.g. a table with a foreign key onto itself) impose no creation
    /// order and are skipped.
    pub fn build(&self, policy: GraphPolicy) -> GraphResult<DependencyGraph> {
        let mut graph = DependencyGraph::with_policy(policy);

        for entry in self.entries.values() {
            graph.add_object(entry.object.clone())?;
        }

        for entry in self.entries.values() {
            for reference in &entry.references {
                if reference == &entry.object.name {
                    debug!(object = %reference, "Skipping self reference");
                    continue;
                }
                graph.add_dependency(&entry.object.name, reference)?;
            }
        }

        crate::log_graph!(
            info,
            "dependency_graph_built",
            objects: graph.node_count(),
            edges: graph.edge_count(),
            dangling_policy: policy.dangling.to_string()
        );
        Ok(graph)
    }

    /// Populate a catalog from a discovery provider.
    ///
    /// Objects outside the selection are not staged; references to them are kept so graph
    /// building can apply its dangling-reference policy. Complexity is raised to at least
    /// the heuristic classification of each object.
    #[instrument(skip(provider, options), fields(schema = ?selector.schema))]
    pub async fn discover(
        provider: &dyn DiscoveryProvider,
        selector: &ObjectSelector,
        options: &JobOptions,
    ) -> ProviderResult<Self> {
        let mut catalog = Self::new();
        let objects = provider.list_objects(selector.schema.as_deref()).await?;

        for mut object in objects {
            if !selector.selects(&object.name) || !options.admits(&object.name) {
                continue;
            }
            let references = provider.list_references(&object.name).await?;
            let heuristic = Complexity::classify(object.kind, &object.definition, references.len());
            object.complexity = object.complexity.max(heuristic);
            catalog.add_with_references(object, references);
        }

        for requested in &selector.objects {
            if !catalog.contains(requested) && options.admits(requested) {
                return Err(ProviderError::NotFound(requested.to_string()));
            }
        }

        crate::log_graph!(info, "catalog_discovered", objects: catalog.len());
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GraphError;
    use crate::graph::DanglingPolicy;
    use crate::models::ObjectKind;

    fn table(n: &str) -> DatabaseObject {
        DatabaseObject::new(
            QualifiedName::new("app", n),
            ObjectKind::Table,
            format!("CREATE TABLE {n} (id INT)"),
            Complexity::Simple,
        )
    }

    #[test]
    fn test_duplicate_insert_replaces() {
        let mut catalog = ObjectCatalog::new();
        assert!(catalog.add(table("a")).is_none());

        let mut changed = table("a");
        changed.definition = "CREATE TABLE a (id BIGINT)".into();
        let replaced = catalog.add(changed).unwrap();

        assert_eq!(replaced.object.definition, "CREATE TABLE a (id INT)");
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get(&QualifiedName::new("app", "a")).unwrap().object.definition,
            "CREATE TABLE a (id BIGINT)"
        );
    }

    #[test]
    fn test_build_edges_from_references() {
        let mut catalog = ObjectCatalog::new();
        let a = QualifiedName::new("app", "a");
        let b = QualifiedName::new("app", "b");
        let replaced = catalog.bulk_load([
            CatalogEntry {
                object: table("a"),
                references: vec![a.clone()],
            },
            CatalogEntry {
                object: table("b"),
                references: vec![a.clone(), QualifiedName::new("ext", "lookup")],
            },
        ]);
        assert_eq!(replaced, 0);

        let graph = catalog.build(GraphPolicy::default()).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependencies_of(&b).len(), 2);
        assert!(graph
            .node(&QualifiedName::new("ext", "lookup"))
            .unwrap()
            .is_placeholder());

        let strict = catalog.build(GraphPolicy {
            dangling: DanglingPolicy::Reject,
            allow_replace: true,
        });
        assert!(matches!(strict, Err(GraphError::UnknownObject { .. })));
    }

    #[test]
    fn test_set_references_rewires_edges() {
        let mut catalog = ObjectCatalog::new();
        catalog.add(table("a"));
        catalog.add(table("b"));
        let a = QualifiedName::new("app", "a");
        let b = QualifiedName::new("app", "b");

        assert!(catalog.set_references(&b, vec![a.clone()]));
        assert!(!catalog.set_references(&QualifiedName::new("app", "missing"), vec![]));

        let graph = catalog.build(GraphPolicy::default()).unwrap();
        assert_eq!(graph.dependencies_of(&b), vec![&a]);
        assert_eq!(graph.dependents_of(&a), vec![&b]);
    }

    #[test]
    fn test_entry_json_shape() {
        let json = r#"{
            "name": "app.orders",
            "kind": "table",
            "definition": "CREATE TABLE orders (id INT)",
            "references": ["app.customers"]
        }"#;
        let entry: CatalogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.object.name, QualifiedName::new("app", "orders"));
        assert_eq!(entry.object.complexity, Complexity::Simple);
        assert_eq!(entry.references, vec![QualifiedName::new("app", "customers")]);
    }
}
