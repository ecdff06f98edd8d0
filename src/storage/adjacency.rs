use crate::types::{EdgeId, TypeId, VertexId};

/// Direction of an adjacency read relative to the bound vertex.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Follow outgoing edges: the bound vertex is the edge source.
    Forward,
    /// Follow incoming edges: the bound vertex is the edge destination.
    Backward,
}

impl Direction {
    /// Upper-case name used in plan explanations.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
        }
    }
}

/// One edge as seen from one endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdjEntry {
    /// Vertex at the other end.
    pub neighbor: VertexId,
    /// Edge type.
    pub ty: TypeId,
    /// Edge id.
    pub edge: EdgeId,
}

/// Adjacency of one vertex in one direction, sorted by `(neighbor, ty)`.
///
/// Entries are kept for every edge the graph still tracks, whatever its
/// batch state; readers filter by visibility.
#[derive(Clone, Debug, Default)]
pub struct AdjacencyList {
    entries: Vec<AdjEntry>,
}

impl AdjacencyList {
    fn position(&self, neighbor: VertexId, ty: TypeId) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| (entry.neighbor, entry.ty).cmp(&(neighbor, ty)))
    }

    /// Inserts or replaces the entry for `(neighbor, ty)`.
    pub fn insert(&mut self, entry: AdjEntry) {
        match self.position(entry.neighbor, entry.ty) {
            Ok(idx) => self.entries[idx] = entry,
            Err(idx) => self.entries.insert(idx, entry),
        }
    }

    /// Removes the entry for `(neighbor, ty)`.
    pub fn remove(&mut self, neighbor: VertexId, ty: TypeId) -> Option<AdjEntry> {
        self.position(neighbor, ty)
            .ok()
            .map(|idx| self.entries.remove(idx))
    }

    /// Entries pointing at `neighbor`, ordered by type.
    pub fn to_neighbor(&self, neighbor: VertexId) -> &[AdjEntry] {
        let start = self.entries.partition_point(|entry| entry.neighbor < neighbor);
        let end = self.entries.partition_point(|entry| entry.neighbor <= neighbor);
        &self.entries[start..end]
    }

    /// Entries sorted by neighbor, then type.
    pub fn iter(&self) -> impl Iterator<Item = &AdjEntry> {
        self.entries.iter()
    }

    /// `true` without entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
