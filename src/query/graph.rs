//! Undirected view of a pattern used for planning.

use std::collections::BTreeMap;

use crate::query::ast::Pattern;

/// One relation endpoint as seen from a variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryEdge {
    /// Variable at the other end of the relation.
    pub neighbor: String,
    /// `true` when the relation points at the owning variable.
    pub incoming: bool,
    /// Index of the relation in declaration order.
    pub relation: usize,
}

/// Adjacency map from variable name to its relation endpoints. Each relation
/// contributes one entry to both of its endpoints, so parallel relations
/// remain distinct.
#[derive(Clone, Debug, Default)]
pub struct QueryGraph {
    adjacency: BTreeMap<String, Vec<QueryEdge>>,
}

impl QueryGraph {
    /// Indexes every relation under both of its endpoints.
    pub fn from_pattern(pattern: &Pattern) -> Self {
        let mut adjacency: BTreeMap<String, Vec<QueryEdge>> = pattern
            .variables
            .iter()
            .map(|var| (var.name.clone(), Vec::new()))
            .collect();
        for (idx, rel) in pattern.relations.iter().enumerate() {
            adjacency.entry(rel.from.clone()).or_default().push(QueryEdge {
                neighbor: rel.to.clone(),
                incoming: false,
                relation: idx,
            });
            adjacency.entry(rel.to.clone()).or_default().push(QueryEdge {
                neighbor: rel.from.clone(),
                incoming: true,
                relation: idx,
            });
        }
        Self { adjacency }
    }

    /// Variable names in lexicographic order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    /// `true` for a pattern without variables.
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Relation endpoints touching `var`; empty for unknown names.
    pub fn edges(&self, var: &str) -> &[QueryEdge] {
        self.adjacency.get(var).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of relation endpoints touching `var`.
    pub fn degree(&self, var: &str) -> usize {
        self.edges(var).len()
    }

    /// Whether any relation joins `a` and `b`.
    pub fn is_adjacent(&self, a: &str, b: &str) -> bool {
        self.edges(a).iter().any(|edge| edge.neighbor == b)
    }

    /// Relations joining `a` and `b`, in declaration order.
    pub fn relations_between(&self, a: &str, b: &str) -> Vec<usize> {
        self.edges(a)
            .iter()
            .filter(|edge| edge.neighbor == b)
            .map(|edge| edge.relation)
            .collect()
    }
}
