//! Edge derivation and graph assembly.
//!
//! Both functions are pure: they turn enriched [`WorkItem`]s into the node
//! and edge lists a renderer consumes.

use crate::domain::{EdgeKind, GraphEdge, GraphNode, WorkItem};

/// Normalized spelling of the hierarchical dependency type.
const PARENT_CHILD: &str = "parent-child";

/// Whether a raw dependency type names the parent/child relationship.
///
/// Comparison ignores ASCII case and treats `_` and `-` as the same character,
/// so "PARENT_CHILD" and "Parent-Child" both match.
pub fn is_parent_child(dependency_type: &str) -> bool {
    dependency_type.len() == PARENT_CHILD.len()
        && dependency_type
            .bytes()
            .zip(PARENT_CHILD.bytes())
            .all(|(raw, want)| {
                let raw = if raw == b'_' { b'-' } else { raw.to_ascii_lowercase() };
                raw == want
            })
}

/// Derive the typed edges pointing into `item`.
///
/// Every dependency reference becomes one edge, in input order. A
/// parent-child reference yields a hierarchy edge, anything else a
/// dependency edge. If the item has a parent pointer that no explicit
/// reference already covered, one hierarchy edge from the parent is appended.
pub fn derive_edges(item: &WorkItem) -> Vec<GraphEdge> {
    let mut edges: Vec<GraphEdge> = item
        .dependencies
        .iter()
        .map(|dep| {
            if is_parent_child(&dep.dependency_type) {
                GraphEdge::hierarchy(&dep.id, &item.id)
            } else {
                GraphEdge::dependency(&dep.id, &item.id)
            }
        })
        .collect();

    if let Some(parent) = item.parent_id() {
        let covered = edges
            .iter()
            .any(|e| e.kind == EdgeKind::Hierarchy && e.from == parent && e.to == item.id);
        if !covered {
            edges.push(GraphEdge::hierarchy(parent, &item.id));
        }
    }

    edges
}

/// Build nodes and edges for a list of items, preserving input order.
pub fn assemble_graph(items: &[WorkItem]) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let nodes = items.iter().map(GraphNode::from).collect();
    let edges = items.iter().flat_map(derive_edges).collect();
    (nodes, edges)
}
