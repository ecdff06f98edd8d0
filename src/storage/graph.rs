#![forbid(unsafe_code)]

//! In-memory graph with one batch of pending edge changes.
//!
//! Every tracked edge carries an [`EdgeState`] describing how the current
//! batch touched it. The four logical [`GraphVersion`]s are views computed
//! from that state, so no edge is ever copied between versions:
//!
//! | state              | PERMANENT | DIFF_PLUS | DIFF_MINUS | MERGED |
//! |--------------------|-----------|-----------|------------|--------|
//! | `Permanent`        | yes       |           |            | yes    |
//! | `Added`            |           | yes       |            | yes    |
//! | `Deleted`          | yes       |           | yes        |        |
//! | `AddedThenDeleted` |           | yes       | yes        |        |
//! | `DeletedThenAdded` | yes       | yes       | yes        | yes    |
//!
//! An edge added and removed inside the same batch stays visible in both
//! diffs so both delta events are reported.
//!
//! Only edges change inside a batch. Vertices and edges committed before it
//! keep their type and properties until it finalizes; staging a different
//! value for them is an error.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::storage::adjacency::{AdjEntry, AdjacencyList, Direction};
use crate::storage::options::GraphOptions;
use crate::storage::types::{prop_get, prop_set, EdgeData, PropMap, PropValue, VertexData};
use crate::types::{EdgeId, FlowError, PropId, Result, TypeId, VertexId};

/// Logical view of the graph read by an intersection rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GraphVersion {
    /// Committed edges, as of the start of the batch.
    Permanent,
    /// Edges added by the batch.
    DiffPlus,
    /// Edges removed by the batch.
    DiffMinus,
    /// The graph as it will read once the batch commits.
    Merged,
}

impl GraphVersion {
    /// Upper-case name used in plan explanations.
    pub fn as_str(self) -> &'static str {
        match self {
            GraphVersion::Permanent => "PERMANENT",
            GraphVersion::DiffPlus => "DIFF_PLUS",
            GraphVersion::DiffMinus => "DIFF_MINUS",
            GraphVersion::Merged => "MERGED",
        }
    }

    /// `true` for the two batch-local versions.
    pub fn is_diff(self) -> bool {
        matches!(self, GraphVersion::DiffPlus | GraphVersion::DiffMinus)
    }
}

impl fmt::Display for GraphVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the pending batch touched an edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeState {
    /// Committed and untouched.
    Permanent,
    /// New in this batch.
    Added,
    /// Committed, removed by this batch.
    Deleted,
    /// New in this batch and removed again.
    AddedThenDeleted,
    /// Committed, removed and re-added by this batch.
    DeletedThenAdded,
}

impl EdgeState {
    /// Whether an edge in this state is part of `version`.
    pub fn visible_in(self, version: GraphVersion) -> bool {
        match version {
            GraphVersion::Permanent => matches!(
                self,
                EdgeState::Permanent | EdgeState::Deleted | EdgeState::DeletedThenAdded
            ),
            GraphVersion::DiffPlus => matches!(
                self,
                EdgeState::Added | EdgeState::AddedThenDeleted | EdgeState::DeletedThenAdded
            ),
            GraphVersion::DiffMinus => matches!(
                self,
                EdgeState::Deleted | EdgeState::AddedThenDeleted | EdgeState::DeletedThenAdded
            ),
            GraphVersion::Merged => matches!(
                self,
                EdgeState::Permanent | EdgeState::Added | EdgeState::DeletedThenAdded
            ),
        }
    }

    fn after_add(self) -> EdgeState {
        match self {
            EdgeState::Deleted => EdgeState::DeletedThenAdded,
            EdgeState::AddedThenDeleted => EdgeState::Added,
            other => other,
        }
    }

    fn after_delete(self) -> Option<EdgeState> {
        match self {
            EdgeState::Permanent | EdgeState::DeletedThenAdded => Some(EdgeState::Deleted),
            EdgeState::Added => Some(EdgeState::AddedThenDeleted),
            EdgeState::Deleted | EdgeState::AddedThenDeleted => None,
        }
    }
}

#[derive(Clone, Debug)]
struct EdgeRecord {
    data: EdgeData,
    state: EdgeState,
}

/// Outcome of [`VersionedGraph::finalize_changes`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FinalizeSummary {
    /// Edges that became part of PERMANENT.
    pub promoted: usize,
    /// Edges dropped from the graph.
    pub removed: usize,
    /// Edges the batch touched.
    pub touched: usize,
}

/// Graph store exposing PERMANENT, DIFF_PLUS, DIFF_MINUS and MERGED views.
///
/// Not synchronised; the engine serialises writers with a lock around the
/// whole batch.
pub struct VersionedGraph {
    vertices: FxHashMap<VertexId, VertexData>,
    forward: FxHashMap<VertexId, AdjacencyList>,
    backward: FxHashMap<VertexId, AdjacencyList>,
    edges: FxHashMap<EdgeId, EdgeRecord>,
    keys: FxHashMap<(VertexId, VertexId, TypeId), EdgeId>,
    next_edge: u64,
    // Edges touched by the pending batch, in first-touch order.
    batch: Vec<EdgeId>,
    batch_seen: FxHashSet<EdgeId>,
    // Prior state of touched vertices, `None` when created by the batch.
    vertex_undo: FxHashMap<VertexId, Option<VertexData>>,
}

impl Default for VersionedGraph {
    fn default() -> Self {
        Self::new(GraphOptions::default())
    }
}

impl VersionedGraph {
    /// Empty graph sized by `opts`.
    pub fn new(opts: GraphOptions) -> Self {
        let cap = opts.vertex_capacity;
        Self {
            vertices: FxHashMap::with_capacity_and_hasher(cap, Default::default()),
            forward: FxHashMap::with_capacity_and_hasher(cap, Default::default()),
            backward: FxHashMap::with_capacity_and_hasher(cap, Default::default()),
            edges: FxHashMap::default(),
            keys: FxHashMap::default(),
            next_edge: 0,
            batch: Vec::new(),
            batch_seen: FxHashSet::default(),
            vertex_undo: FxHashMap::default(),
        }
    }

    /// Sorted, duplicate-free neighbors of `vertex` reachable in `direction`
    /// through edges of `version`, optionally restricted to one edge type.
    /// Parallel edges collapse here; [`Self::edges_between`] lists them.
    pub fn neighbors(
        &self,
        vertex: VertexId,
        direction: Direction,
        version: GraphVersion,
        ty: Option<TypeId>,
    ) -> Vec<VertexId> {
        let Some(list) = self.adjacency(direction).get(&vertex) else {
            return Vec::new();
        };
        let mut out: Vec<VertexId> = Vec::new();
        for entry in list.iter() {
            if ty.is_some_and(|ty| ty != entry.ty) || !self.entry_visible(entry, version) {
                continue;
            }
            // Entries are sorted by neighbor, so duplicates are adjacent.
            if out.last() != Some(&entry.neighbor) {
                out.push(entry.neighbor);
            }
        }
        out
    }

    /// Sorted vertices with at least one edge of `version` in `direction`.
    pub fn source_vertices(&self, version: GraphVersion, direction: Direction) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = if version.is_diff() {
            self.batch
                .iter()
                .filter_map(|id| self.edges.get(id))
                .filter(|record| record.state.visible_in(version))
                .map(|record| match direction {
                    Direction::Forward => record.data.src,
                    Direction::Backward => record.data.dst,
                })
                .collect()
        } else {
            self.adjacency(direction)
                .iter()
                .filter(|(_, list)| list.iter().any(|entry| self.entry_visible(entry, version)))
                .map(|(vertex, _)| *vertex)
                .collect()
        };
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every known vertex, sorted.
    pub fn vertices(&self) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = self.vertices.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Number of known vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Type of `vertex`, `None` when unknown.
    pub fn vertex_type(&self, vertex: VertexId) -> Option<TypeId> {
        self.vertices.get(&vertex).map(|data| data.ty)
    }

    /// Property `prop` of `vertex`.
    pub fn vertex_prop(&self, vertex: VertexId, prop: PropId) -> Option<&PropValue> {
        self.vertices
            .get(&vertex)
            .and_then(|data| prop_get(&data.props, prop))
    }

    /// Endpoints, type and properties of a tracked edge.
    pub fn edge(&self, edge: EdgeId) -> Option<&EdgeData> {
        self.edges.get(&edge).map(|record| &record.data)
    }

    /// How the pending batch touched `edge`.
    pub fn edge_state(&self, edge: EdgeId) -> Option<EdgeState> {
        self.edges.get(&edge).map(|record| record.state)
    }

    /// Property `prop` of `edge`.
    pub fn edge_prop(&self, edge: EdgeId, prop: PropId) -> Option<&PropValue> {
        self.edges
            .get(&edge)
            .and_then(|record| prop_get(&record.data.props, prop))
    }

    /// Number of edges visible in `version`.
    pub fn edge_count(&self, version: GraphVersion) -> usize {
        self.edges
            .values()
            .filter(|record| record.state.visible_in(version))
            .count()
    }

    /// Every edge `from -> to` visible in `version`, ordered by type id.
    /// Without a type filter each parallel edge is listed.
    pub fn edges_between(
        &self,
        from: VertexId,
        to: VertexId,
        ty: Option<TypeId>,
        version: GraphVersion,
    ) -> Vec<EdgeId> {
        let Some(list) = self.forward.get(&from) else {
            return Vec::new();
        };
        list.to_neighbor(to)
            .iter()
            .filter(|entry| ty.map_or(true, |ty| ty == entry.ty))
            .filter(|entry| self.entry_visible(entry, version))
            .map(|entry| entry.edge)
            .collect()
    }

    /// Id of the edge `from -> to` visible in `version`. With no type filter
    /// the edge with the smallest type id wins.
    pub fn resolve_edge_id(
        &self,
        from: VertexId,
        to: VertexId,
        ty: Option<TypeId>,
        version: GraphVersion,
    ) -> Result<EdgeId> {
        self.edges_between(from, to, ty, version)
            .first()
            .copied()
            .ok_or_else(|| {
                FlowError::Invariant(format!(
                    "no edge {from}->{to} (type {}) in {version}",
                    ty.map_or_else(|| "any".to_owned(), |ty| ty.to_string())
                ))
            })
    }

    /// Creates `vertex` if needed, optionally setting its type and properties.
    ///
    /// A vertex committed before the batch only accepts its current values.
    pub fn upsert_vertex(
        &mut self,
        vertex: VertexId,
        ty: Option<TypeId>,
        props: impl IntoIterator<Item = (PropId, PropValue)>,
    ) -> Result<()> {
        self.remember_vertex(vertex);
        let committed = matches!(self.vertex_undo.get(&vertex), Some(Some(_)));
        let data = self.vertices.entry(vertex).or_default();
        if committed {
            if let Some(ty) = ty.filter(|ty| *ty != data.ty) {
                return Err(FlowError::InvalidOwned(format!(
                    "vertex {vertex} is committed with type {}; cannot retype it to {ty} inside a batch",
                    data.ty
                )));
            }
            for (prop, value) in props {
                if prop_get(&data.props, prop) != Some(&value) {
                    return Err(FlowError::InvalidOwned(format!(
                        "vertex {vertex} is committed; cannot change property {prop} inside a batch"
                    )));
                }
            }
            return Ok(());
        }
        if let Some(ty) = ty {
            data.ty = ty;
        }
        for (prop, value) in props {
            prop_set(&mut data.props, prop, value);
        }
        Ok(())
    }

    /// Stages an edge addition. An edge staged earlier in the batch takes the
    /// new properties; a committed edge only accepts its current values.
    pub fn add_edge(
        &mut self,
        src: VertexId,
        dst: VertexId,
        ty: TypeId,
        props: impl IntoIterator<Item = (PropId, PropValue)>,
    ) -> Result<EdgeId> {
        let props: Vec<(PropId, PropValue)> = props.into_iter().collect();
        let committed = self
            .keys
            .get(&(src, dst, ty))
            .and_then(|id| self.edges.get(id))
            .filter(|record| record.state.visible_in(GraphVersion::Permanent));
        if let Some(record) = committed {
            if let Some((prop, _)) = props
                .iter()
                .find(|(prop, value)| prop_get(&record.data.props, *prop) != Some(value))
            {
                return Err(FlowError::InvalidOwned(format!(
                    "edge {src}->{dst} is committed; cannot change property {prop} inside a batch"
                )));
            }
        }
        self.upsert_vertex(src, None, std::iter::empty())?;
        self.upsert_vertex(dst, None, std::iter::empty())?;
        let id = match self.keys.get(&(src, dst, ty)) {
            Some(id) => *id,
            None => {
                let id = EdgeId(self.next_edge);
                self.next_edge += 1;
                self.keys.insert((src, dst, ty), id);
                self.edges.insert(
                    id,
                    EdgeRecord {
                        data: EdgeData {
                            src,
                            dst,
                            ty,
                            props: PropMap::new(),
                        },
                        state: EdgeState::Added,
                    },
                );
                self.forward.entry(src).or_default().insert(AdjEntry {
                    neighbor: dst,
                    ty,
                    edge: id,
                });
                self.backward.entry(dst).or_default().insert(AdjEntry {
                    neighbor: src,
                    ty,
                    edge: id,
                });
                id
            }
        };
        self.touch(id);
        if let Some(record) = self.edges.get_mut(&id) {
            let before = record.state;
            record.state = before.after_add();
            for (prop, value) in props {
                prop_set(&mut record.data.props, prop, value);
            }
            trace!(edge = id.0, ?before, after = ?record.state, "graph.add_edge");
        }
        Ok(id)
    }

    /// Stages an edge removal. Returns `false` when no edge with this key is
    /// visible after the batch.
    pub fn delete_edge(&mut self, src: VertexId, dst: VertexId, ty: TypeId) -> bool {
        let Some(id) = self.keys.get(&(src, dst, ty)).copied() else {
            return false;
        };
        let next = match self.edges.get(&id) {
            Some(record) => record.state.after_delete(),
            None => None,
        };
        let Some(next) = next else {
            return false;
        };
        self.touch(id);
        if let Some(record) = self.edges.get_mut(&id) {
            trace!(edge = id.0, before = ?record.state, after = ?next, "graph.delete_edge");
            record.state = next;
        }
        true
    }

    /// `true` while a batch is staged.
    pub fn has_pending_changes(&self) -> bool {
        !self.batch.is_empty()
    }

    /// Folds the batch into PERMANENT: edges visible in MERGED become
    /// permanent, the rest are dropped.
    pub fn finalize_changes(&mut self) -> FinalizeSummary {
        let mut summary = FinalizeSummary {
            touched: self.batch.len(),
            ..FinalizeSummary::default()
        };
        for id in std::mem::take(&mut self.batch) {
            let Some(state) = self.edges.get(&id).map(|record| record.state) else {
                continue;
            };
            if state.visible_in(GraphVersion::Merged) {
                if state != EdgeState::Permanent && !state.visible_in(GraphVersion::Permanent) {
                    summary.promoted += 1;
                }
                if let Some(record) = self.edges.get_mut(&id) {
                    record.state = EdgeState::Permanent;
                }
            } else {
                self.drop_edge(id);
                if state.visible_in(GraphVersion::Permanent) {
                    summary.removed += 1;
                }
            }
        }
        self.clear_batch();
        debug!(
            promoted = summary.promoted,
            removed = summary.removed,
            touched = summary.touched,
            "graph.finalize"
        );
        summary
    }

    /// Discards the batch, restoring the graph as of its start. Returns the
    /// number of edges the batch had touched.
    pub fn rollback_changes(&mut self) -> usize {
        let touched = self.batch.len();
        for id in std::mem::take(&mut self.batch) {
            let Some(state) = self.edges.get(&id).map(|record| record.state) else {
                continue;
            };
            match state {
                EdgeState::Added | EdgeState::AddedThenDeleted => self.drop_edge(id),
                EdgeState::Permanent | EdgeState::Deleted | EdgeState::DeletedThenAdded => {
                    if let Some(record) = self.edges.get_mut(&id) {
                        record.state = EdgeState::Permanent;
                    }
                }
            }
        }
        for (vertex, prior) in std::mem::take(&mut self.vertex_undo) {
            match prior {
                Some(data) => {
                    self.vertices.insert(vertex, data);
                }
                None => {
                    self.vertices.remove(&vertex);
                }
            }
        }
        self.clear_batch();
        debug!(touched, "graph.rollback");
        touched
    }

    fn adjacency(&self, direction: Direction) -> &FxHashMap<VertexId, AdjacencyList> {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    fn entry_visible(&self, entry: &AdjEntry, version: GraphVersion) -> bool {
        self.edges
            .get(&entry.edge)
            .is_some_and(|record| record.state.visible_in(version))
    }

    fn touch(&mut self, id: EdgeId) {
        if self.batch_seen.insert(id) {
            self.batch.push(id);
        }
    }

    fn remember_vertex(&mut self, vertex: VertexId) {
        if !self.vertex_undo.contains_key(&vertex) {
            let prior = self.vertices.get(&vertex).cloned();
            self.vertex_undo.insert(vertex, prior);
        }
    }

    fn drop_edge(&mut self, id: EdgeId) {
        let Some(record) = self.edges.remove(&id) else {
            return;
        };
        let EdgeData { src, dst, ty, .. } = record.data;
        self.keys.remove(&(src, dst, ty));
        if let Some(list) = self.forward.get_mut(&src) {
            list.remove(dst, ty);
            if list.is_empty() {
                self.forward.remove(&src);
            }
        }
        if let Some(list) = self.backward.get_mut(&dst) {
            list.remove(src, ty);
            if list.is_empty() {
                self.backward.remove(&dst);
            }
        }
    }

    fn clear_batch(&mut self) {
        self.batch_seen.clear();
        self.vertex_undo.clear();
    }
}
