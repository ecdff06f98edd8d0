//! Generic Join execution.
//!
//! A plan is turned into a chain of pull streams,
//! `Scan -> Extend* -> EdgeIdResolver -> Filter?`, drained by the sink
//! adapter. Streams borrow the graph for the duration of one execution and
//! never mutate it.

use std::cmp::Ordering as CmpOrdering;

use smallvec::SmallVec;
use tracing::trace;

use crate::query::ast::ComparisonOp;
use crate::query::physical::{
    EdgeSlot, FilterOperand, FilterPredicate, OneTimeMatchQueryPlan, Slot, Stage,
};
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::sink::{InMemorySink, MatchKind, MatchRow, OutputSink};
use crate::storage::{PropValue, VersionedGraph};
use crate::types::{EdgeId, FlowError, PropId, Result, TypeId, VertexId};

/// Partial match flowing between operators: vertices in plan order, then the
/// resolved edges once the resolver has run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Tuple {
    /// Bound vertices in plan order.
    pub vertices: SmallVec<[VertexId; 8]>,
    /// Resolved edges in declaration order.
    pub edges: SmallVec<[EdgeId; 8]>,
}

/// Counters for one plan execution.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecutionStats {
    /// Rows handed to the sink.
    pub rows: usize,
    /// Rows dropped by the filter.
    pub filtered: usize,
}

trait TupleStream {
    fn try_next(&mut self) -> Result<Option<Tuple>>;
}

type BoxTupleStream<'g> = Box<dyn TupleStream + 'g>;

/// Runs `plan` against `graph`, appending every surviving row to `sink`.
pub fn execute(
    plan: &OneTimeMatchQueryPlan,
    graph: &VersionedGraph,
    sink: &mut dyn OutputSink,
) -> Result<ExecutionStats> {
    check_shape(plan)?;
    let kind = plan.match_kind();
    let mut stats = ExecutionStats::default();
    let mut stream = build_pipeline(plan, graph, &mut stats.filtered)?;
    while let Some(tuple) = stream.try_next()? {
        let sink_timer = profile_timer();
        let row = output_row(plan, &tuple)?;
        sink.append(kind, &row)?;
        record_profile_timer(QueryProfileKind::Sink, sink_timer);
        stats.rows += 1;
    }
    drop(stream);
    trace!(rows = stats.rows, filtered = stats.filtered, %kind, "executor.done");
    Ok(stats)
}

/// Runs `plan` and collects its rows.
pub fn collect(plan: &OneTimeMatchQueryPlan, graph: &VersionedGraph) -> Result<Vec<MatchRow>> {
    let mut sink = InMemorySink::new();
    execute(plan, graph, &mut sink)?;
    Ok(sink.take().into_iter().map(|(_, row)| row).collect())
}

fn check_shape(plan: &OneTimeMatchQueryPlan) -> Result<()> {
    let vars = plan.ordered_variables.len();
    if vars < 2 || plan.stages.len() != vars - 1 || plan.variable_types.len() != vars {
        return Err(FlowError::Invariant(format!(
            "plan has {vars} variables, {} stages and {} variable types",
            plan.stages.len(),
            plan.variable_types.len()
        )));
    }
    if plan.stages[0].is_empty() {
        return Err(FlowError::Invariant(
            "first stage must hold at least one rule".to_owned(),
        ));
    }
    if plan.tail.vertex_columns.iter().any(|col| *col >= vars) {
        return Err(FlowError::Invariant(
            "output column outside the vertex prefix".to_owned(),
        ));
    }
    Ok(())
}

fn build_pipeline<'g>(
    plan: &'g OneTimeMatchQueryPlan,
    graph: &'g VersionedGraph,
    filtered: &'g mut usize,
) -> Result<BoxTupleStream<'g>> {
    let mut stream: BoxTupleStream<'g> = Box::new(ScanStream::new(
        graph,
        &plan.stages[0],
        plan.variable_types[0],
        plan.variable_types[1],
    ));
    for (idx, stage) in plan.stages.iter().enumerate().skip(1) {
        stream = Box::new(ExtendStream {
            input: stream,
            graph,
            stage,
            target_type: plan.variable_types[idx + 1],
            all_vertices: None,
            current: None,
        });
    }
    stream = Box::new(ResolveStream {
        input: stream,
        graph,
        edges: &plan.tail.edges,
        current: None,
    });
    if !plan.tail.predicates.is_empty() {
        stream = Box::new(FilterStream {
            input: stream,
            graph,
            predicates: &plan.tail.predicates,
            filtered,
        });
    }
    Ok(stream)
}

fn output_row(plan: &OneTimeMatchQueryPlan, tuple: &Tuple) -> Result<MatchRow> {
    let vertices = plan
        .tail
        .vertex_columns
        .iter()
        .map(|col| {
            tuple.vertices.get(*col).copied().ok_or_else(|| {
                FlowError::Invariant(format!("tuple has no vertex in slot {col}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MatchRow {
        vertices,
        edges: tuple.edges.to_vec(),
    })
}

fn type_matches(graph: &VersionedGraph, vertex: VertexId, declared: Option<TypeId>) -> bool {
    declared.map_or(true, |ty| graph.vertex_type(vertex) == Some(ty))
}

/// Intersects the neighbor lists of every rule of `stage`, each read at the
/// rule's own version. Shortest list first.
fn intersect_stage(
    graph: &VersionedGraph,
    stage: &Stage,
    prefix: &[VertexId],
) -> Result<Vec<VertexId>> {
    let mut lists: Vec<Vec<VertexId>> = Vec::with_capacity(stage.len());
    for rule in stage {
        let bound = prefix.get(rule.prefix_index).ok_or_else(|| {
            FlowError::Invariant(format!(
                "rule reads prefix slot {} of a {}-vertex tuple",
                rule.prefix_index,
                prefix.len()
            ))
        })?;
        let list = graph.neighbors(*bound, rule.direction, rule.version, rule.edge_type);
        if list.is_empty() {
            return Ok(Vec::new());
        }
        lists.push(list);
    }
    lists.sort_by_key(Vec::len);
    let mut lists = lists.into_iter();
    let Some(mut acc) = lists.next() else {
        return Ok(Vec::new());
    };
    for list in lists {
        acc = intersect_sorted(&acc, &list);
        if acc.is_empty() {
            break;
        }
    }
    Ok(acc)
}

fn intersect_sorted(left: &[VertexId], right: &[VertexId]) -> Vec<VertexId> {
    let mut out = Vec::with_capacity(left.len().min(right.len()));
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            CmpOrdering::Less => i += 1,
            CmpOrdering::Greater => j += 1,
            CmpOrdering::Equal => {
                out.push(left[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

// Candidates for the next variable of one prefix tuple.
struct Pending {
    base: Tuple,
    candidates: Vec<VertexId>,
    next: usize,
}

impl Pending {
    fn next_tuple(&mut self) -> Option<Tuple> {
        let candidate = *self.candidates.get(self.next)?;
        self.next += 1;
        let mut tuple = self.base.clone();
        tuple.vertices.push(candidate);
        Some(tuple)
    }
}

struct ScanStream<'g> {
    graph: &'g VersionedGraph,
    stage: &'g Stage,
    first_type: Option<TypeId>,
    second_type: Option<TypeId>,
    sources: Option<std::vec::IntoIter<VertexId>>,
    current: Option<Pending>,
}

impl<'g> ScanStream<'g> {
    fn new(
        graph: &'g VersionedGraph,
        stage: &'g Stage,
        first_type: Option<TypeId>,
        second_type: Option<TypeId>,
    ) -> Self {
        Self {
            graph,
            stage,
            first_type,
            second_type,
            sources: None,
            current: None,
        }
    }
}

impl TupleStream for ScanStream<'_> {
    fn try_next(&mut self) -> Result<Option<Tuple>> {
        let scan_timer = profile_timer();
        let result = self.try_next_inner();
        record_profile_timer(QueryProfileKind::Scan, scan_timer);
        result
    }
}

impl ScanStream<'_> {
    fn try_next_inner(&mut self) -> Result<Option<Tuple>> {
        if self.sources.is_none() {
            let Some(first) = self.stage.first() else {
                return Ok(None);
            };
            let sources = self.graph.source_vertices(first.version, first.direction);
            trace!(sources = sources.len(), version = %first.version, "executor.scan.start");
            self.sources = Some(sources.into_iter());
        }
        loop {
            if let Some(tuple) = self.current.as_mut().and_then(Pending::next_tuple) {
                return Ok(Some(tuple));
            }
            self.current = None;
            let Some(source) = self.sources.as_mut().and_then(Iterator::next) else {
                return Ok(None);
            };
            if !type_matches(self.graph, source, self.first_type) {
                continue;
            }
            let mut candidates = intersect_stage(self.graph, self.stage, &[source])?;
            candidates.retain(|v| type_matches(self.graph, *v, self.second_type));
            if candidates.is_empty() {
                continue;
            }
            let mut base = Tuple::default();
            base.vertices.push(source);
            self.current = Some(Pending {
                base,
                candidates,
                next: 0,
            });
        }
    }
}

struct ExtendStream<'g> {
    input: BoxTupleStream<'g>,
    graph: &'g VersionedGraph,
    stage: &'g Stage,
    target_type: Option<TypeId>,
    // Filled on first use when the stage is empty.
    all_vertices: Option<Vec<VertexId>>,
    current: Option<Pending>,
}

impl TupleStream for ExtendStream<'_> {
    fn try_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.current.as_mut().and_then(Pending::next_tuple) {
                return Ok(Some(tuple));
            }
            self.current = None;
            let Some(base) = self.input.try_next()? else {
                return Ok(None);
            };
            let extend_timer = profile_timer();
            let candidates = self.candidates(&base);
            record_profile_timer(QueryProfileKind::Extend, extend_timer);
            let candidates = candidates?;
            if candidates.is_empty() {
                continue;
            }
            self.current = Some(Pending {
                base,
                candidates,
                next: 0,
            });
        }
    }
}

impl ExtendStream<'_> {
    fn candidates(&mut self, base: &Tuple) -> Result<Vec<VertexId>> {
        let mut candidates = if self.stage.is_empty() {
            let graph = self.graph;
            self.all_vertices
                .get_or_insert_with(|| graph.vertices())
                .clone()
        } else {
            intersect_stage(self.graph, self.stage, &base.vertices)?
        };
        candidates.retain(|v| type_matches(self.graph, *v, self.target_type));
        Ok(candidates)
    }
}

// Edge candidates of every relation for one vertex tuple. Rows walk their
// cartesian product with the last relation varying fastest.
struct EdgeChoices {
    base: Tuple,
    choices: Vec<Vec<EdgeId>>,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl EdgeChoices {
    fn new(base: Tuple, choices: Vec<Vec<EdgeId>>) -> Self {
        Self {
            base,
            cursor: vec![0; choices.len()],
            exhausted: choices.iter().any(Vec::is_empty),
            choices,
        }
    }

    fn next_tuple(&mut self) -> Option<Tuple> {
        if self.exhausted {
            return None;
        }
        let mut tuple = self.base.clone();
        tuple.edges = self
            .cursor
            .iter()
            .zip(&self.choices)
            .filter_map(|(idx, list)| list.get(*idx).copied())
            .collect();
        self.exhausted = true;
        for slot in (0..self.cursor.len()).rev() {
            self.cursor[slot] += 1;
            if self.cursor[slot] < self.choices[slot].len() {
                self.exhausted = false;
                break;
            }
            self.cursor[slot] = 0;
        }
        Some(tuple)
    }
}

/// Binds every relation to a concrete edge. A wildcard relation over
/// parallel edges yields one row per edge.
struct ResolveStream<'g> {
    input: BoxTupleStream<'g>,
    graph: &'g VersionedGraph,
    edges: &'g [EdgeSlot],
    current: Option<EdgeChoices>,
}

impl TupleStream for ResolveStream<'_> {
    fn try_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = self.current.as_mut().and_then(EdgeChoices::next_tuple) {
                return Ok(Some(tuple));
            }
            self.current = None;
            let Some(base) = self.input.try_next()? else {
                return Ok(None);
            };
            let resolve_timer = profile_timer();
            let choices = self.resolve(&base);
            record_profile_timer(QueryProfileKind::EdgeIdResolver, resolve_timer);
            self.current = Some(EdgeChoices::new(base, choices?));
        }
    }
}

impl ResolveStream<'_> {
    fn resolve(&self, tuple: &Tuple) -> Result<Vec<Vec<EdgeId>>> {
        self.edges
            .iter()
            .map(|slot| -> Result<Vec<EdgeId>> {
                let endpoint = |idx: usize| {
                    tuple.vertices.get(idx).copied().ok_or_else(|| {
                        FlowError::Invariant(format!(
                            "relation '{}' reads unbound slot {idx}",
                            slot.name
                        ))
                    })
                };
                let from = endpoint(slot.from_slot)?;
                let to = endpoint(slot.to_slot)?;
                let edges = self
                    .graph
                    .edges_between(from, to, slot.edge_type, slot.version);
                if edges.is_empty() {
                    return Err(FlowError::Invariant(format!(
                        "relation '{}': no edge {from}->{to} in {}",
                        slot.name, slot.version
                    )));
                }
                Ok(edges)
            })
            .collect()
    }
}

struct FilterStream<'g> {
    input: BoxTupleStream<'g>,
    graph: &'g VersionedGraph,
    predicates: &'g [FilterPredicate],
    filtered: &'g mut usize,
}

impl TupleStream for FilterStream<'_> {
    fn try_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let Some(tuple) = self.input.try_next()? else {
                return Ok(None);
            };
            let filter_timer = profile_timer();
            let keep = self
                .predicates
                .iter()
                .all(|pred| evaluate_predicate(self.graph, &tuple, pred));
            record_profile_timer(QueryProfileKind::Filter, filter_timer);
            if keep {
                return Ok(Some(tuple));
            }
            *self.filtered += 1;
        }
    }
}

fn slot_prop<'g>(
    graph: &'g VersionedGraph,
    tuple: &Tuple,
    slot: Slot,
    prop: PropId,
) -> Option<&'g PropValue> {
    match slot {
        Slot::Vertex(idx) => graph.vertex_prop(*tuple.vertices.get(idx)?, prop),
        Slot::Edge(idx) => graph.edge_prop(*tuple.edges.get(idx)?, prop),
    }
}

/// Missing properties, nulls and values of incompatible kinds never satisfy
/// a predicate.
fn evaluate_predicate(graph: &VersionedGraph, tuple: &Tuple, pred: &FilterPredicate) -> bool {
    let Some(left) = slot_prop(graph, tuple, pred.slot, pred.prop) else {
        return false;
    };
    let right = match &pred.right {
        FilterOperand::Literal(value) => value,
        FilterOperand::Property { slot, prop } => match slot_prop(graph, tuple, *slot, *prop) {
            Some(value) => value,
            None => return false,
        },
    };
    let Some(ord) = compare_values(left, right) else {
        return false;
    };
    match pred.op {
        ComparisonOp::Eq => ord == CmpOrdering::Equal,
        ComparisonOp::Ne => ord != CmpOrdering::Equal,
        ComparisonOp::Lt => ord == CmpOrdering::Less,
        ComparisonOp::Le => ord != CmpOrdering::Greater,
        ComparisonOp::Gt => ord == CmpOrdering::Greater,
        ComparisonOp::Ge => ord != CmpOrdering::Less,
    }
}

fn compare_values(left: &PropValue, right: &PropValue) -> Option<CmpOrdering> {
    match (left, right) {
        (PropValue::Bool(a), PropValue::Bool(b)) => Some(a.cmp(b)),
        (PropValue::Int(a), PropValue::Int(b)) => Some(a.cmp(b)),
        (PropValue::Int(a), PropValue::Float(b)) => (*a as f64).partial_cmp(b),
        (PropValue::Float(a), PropValue::Int(b)) => a.partial_cmp(&(*b as f64)),
        (PropValue::Float(a), PropValue::Float(b)) => a.partial_cmp(b),
        (PropValue::Str(a), PropValue::Str(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
