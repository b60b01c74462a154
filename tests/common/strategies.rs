use proptest::prelude::*;

/// Random DAG as (node count, edges) where each edge `(dependent, dependency)` points to a
/// lower index, so the graph is acyclic by construction
pub fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..24).prop_flat_map(|nodes| {
        let edge = (1..nodes).prop_flat_map(|dependent| (Just(dependent), 0..dependent));
        (Just(nodes), prop::collection::vec(edge, 0..nodes * 2))
    })
}

/// Chain length for cycle properties
pub fn cycle_length_strategy() -> impl Strategy<Value = usize> {
    2usize..8
}

/// Node name for index `i`, zero padded so lexical order matches index order
pub fn node_name(i: usize) -> String {
    format!("n{i:03}")
}
