//! Engine facade: owns the injected services, keeps the registry of standing
//! queries and applies CREATE/DELETE batches.
//!
//! A batch runs entirely under the graph's write lock: stage the diffs, run
//! every delta query of every registered continuous query, then fold the
//! diffs into the committed graph. Any error rolls the diffs back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::query::ast::{EdgeKey, EdgeSpec, Literal, OutputTarget, Pattern, StructuredQuery};
use crate::query::executor::{self, ExecutionStats};
use crate::query::physical::{ContinuousMatchQueryPlan, PlanExplain};
use crate::query::planner::{ContinuousMatchPlanner, OneTimeMatchPlanner};
use crate::sink::{shared, CallbackSink, FileSink, MatchKind, MatchRow, SharedSink};
use crate::storage::{FinalizeSummary, PropValue, TypeStore, VersionedGraph};
use crate::types::{FlowError, PropId, Result, TypeId, VertexId};

/// Identifies a registered continuous query.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct QueryHandle(pub u64);

/// Result of one applied batch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BatchSummary {
    /// Rows reported as [`MatchKind::Emerged`] across all continuous queries.
    pub emerged: usize,
    /// Rows reported as [`MatchKind::Deleted`] across all continuous queries.
    pub deleted: usize,
    /// Deletes that addressed no live edge.
    pub missing_deletes: usize,
    /// How the graph changed when the batch committed.
    pub finalize: FinalizeSummary,
}

/// One element of a mixed batch.
#[derive(Clone, Debug, PartialEq)]
pub enum EdgeChange {
    /// Add an edge, creating its endpoints if needed.
    Create(EdgeSpec),
    /// Remove the edge with this key.
    Delete(EdgeKey),
}

/// What [`Engine::execute`] did.
#[derive(Debug)]
pub enum ExecuteOutcome {
    /// Rows of a one-time MATCH, in pattern variable order.
    Rows(Vec<MatchRow>),
    /// A continuous query was registered.
    Registered(QueryHandle),
    /// A CREATE or DELETE batch was applied.
    Applied(BatchSummary),
}

struct RegisteredQuery {
    handle: QueryHandle,
    plan: ContinuousMatchQueryPlan,
}

/// Continuous subgraph-matching engine.
pub struct Engine {
    graph: Arc<RwLock<VersionedGraph>>,
    types: Arc<TypeStore>,
    config: EngineConfig,
    queries: Mutex<Vec<RegisteredQuery>>,
    callbacks: Mutex<FxHashMap<String, SharedSink>>,
    next_handle: AtomicU64,
}

impl Engine {
    /// Creates an engine with fresh services.
    pub fn new(config: EngineConfig) -> Self {
        let graph = Arc::new(RwLock::new(VersionedGraph::new(config.graph_options())));
        Self::with_services(config, graph, Arc::new(TypeStore::new()))
    }

    /// Creates an engine over existing services.
    pub fn with_services(
        config: EngineConfig,
        graph: Arc<RwLock<VersionedGraph>>,
        types: Arc<TypeStore>,
    ) -> Self {
        Self {
            graph,
            types,
            config,
            queries: Mutex::new(Vec::new()),
            callbacks: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Shared handle to the data graph.
    pub fn graph(&self) -> Arc<RwLock<VersionedGraph>> {
        Arc::clone(&self.graph)
    }

    /// Shared type and property-key catalog.
    pub fn types(&self) -> Arc<TypeStore> {
        Arc::clone(&self.types)
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a closure reachable as `OutputTarget::Callback(name)`.
    ///
    /// The closure runs inside the batch, while the graph write lock is held.
    /// It must not call back into this engine: `match_once`, `explain` and the
    /// batch methods would block forever. Forward rows elsewhere instead.
    pub fn register_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnMut(MatchKind, &MatchRow) + Send + 'static,
    {
        self.register_sink(name, shared(CallbackSink::new(callback)));
    }

    /// Registers any sink under a callback name. Same locking rules as
    /// [`Engine::register_callback`].
    pub fn register_sink(&self, name: impl Into<String>, sink: SharedSink) {
        let name = name.into();
        debug!(name = %name, "engine.callback.registered");
        self.callbacks.lock().insert(name, sink);
    }

    /// Dispatches a parsed query.
    pub fn execute(&self, query: StructuredQuery) -> Result<ExecuteOutcome> {
        trace!(op = query.operation(), "engine.execute");
        match query {
            StructuredQuery::Match(pattern) => self.match_once(&pattern).map(ExecuteOutcome::Rows),
            StructuredQuery::ContinuousMatch { pattern, output } => self
                .register_continuous(&pattern, &output)
                .map(ExecuteOutcome::Registered),
            StructuredQuery::Create(edges) => {
                self.create_edges(&edges).map(ExecuteOutcome::Applied)
            }
            StructuredQuery::Delete(keys) => self.delete_edges(&keys).map(ExecuteOutcome::Applied),
        }
    }

    /// Runs a one-time match over the committed graph.
    pub fn match_once(&self, pattern: &Pattern) -> Result<Vec<MatchRow>> {
        let plan = OneTimeMatchPlanner::new(self.types()).plan_pattern(pattern)?;
        if self.config.planner.explain {
            debug!(explain = %plan.explain(), "engine.match.plan");
        }
        let graph = self.graph.read();
        let rows = executor::collect(&plan, &graph)?;
        debug!(rows = rows.len(), "engine.match.done");
        Ok(rows)
    }

    /// Plans `pattern` as a standing query delivering to `output`.
    pub fn register_continuous(&self, pattern: &Pattern, output: &OutputTarget) -> Result<QueryHandle> {
        let sink = self.resolve_output(output)?;
        self.register_continuous_with_sink(pattern, sink)
    }

    /// Plans `pattern` as a standing query delivering to `sink`.
    pub fn register_continuous_with_sink(&self, pattern: &Pattern, sink: SharedSink) -> Result<QueryHandle> {
        let plan = ContinuousMatchPlanner::new(self.types()).plan_pattern(pattern, sink)?;
        if self.config.planner.explain {
            debug!(explain = %plan.explain(), "engine.continuous.plan");
        }
        let handle = QueryHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        info!(
            handle = handle.0,
            relations = plan.relation_names.len(),
            delta_queries = plan.len(),
            "engine.continuous.registered"
        );
        self.queries.lock().push(RegisteredQuery { handle, plan });
        Ok(handle)
    }

    /// Removes a continuous query. Returns `false` for unknown handles.
    pub fn unregister(&self, handle: QueryHandle) -> bool {
        let mut queries = self.queries.lock();
        let before = queries.len();
        queries.retain(|query| query.handle != handle);
        let removed = queries.len() != before;
        if removed {
            info!(handle = handle.0, "engine.continuous.unregistered");
        }
        removed
    }

    /// Number of registered continuous queries.
    pub fn continuous_query_count(&self) -> usize {
        self.queries.lock().len()
    }

    /// Explain tree of the plan `query` would run.
    pub fn explain(&self, query: &StructuredQuery) -> Result<PlanExplain> {
        match query {
            StructuredQuery::Match(pattern) => Ok(OneTimeMatchPlanner::new(self.types())
                .plan_pattern(pattern)?
                .explain()),
            StructuredQuery::ContinuousMatch { pattern, .. } => {
                let sink = shared(crate::sink::InMemorySink::new());
                Ok(ContinuousMatchPlanner::new(self.types())
                    .plan_pattern(pattern, sink)?
                    .explain())
            }
            other => Err(FlowError::InvalidOwned(format!(
                "{} queries have no plan to explain",
                other.operation()
            ))),
        }
    }

    /// Adds edges (and endpoint types/properties) as one batch.
    pub fn create_edges(&self, edges: &[EdgeSpec]) -> Result<BatchSummary> {
        let changes: Vec<EdgeChange> = edges.iter().cloned().map(EdgeChange::Create).collect();
        self.apply_changes(&changes)
    }

    /// Removes edges as one batch.
    pub fn delete_edges(&self, keys: &[EdgeKey]) -> Result<BatchSummary> {
        let changes: Vec<EdgeChange> = keys.iter().cloned().map(EdgeChange::Delete).collect();
        self.apply_changes(&changes)
    }

    /// Applies creates and deletes, in order, as one batch. Delete types are
    /// looked up, never created: an unknown type name fails the whole batch
    /// before anything is staged.
    pub fn apply_changes(&self, changes: &[EdgeChange]) -> Result<BatchSummary> {
        let staged = changes
            .iter()
            .map(|change| -> Result<StagedChange> {
                Ok(match change {
                    EdgeChange::Create(spec) => StagedChange::Create(self.stage_create(spec)),
                    EdgeChange::Delete(key) => StagedChange::Delete {
                        from: key.from,
                        to: key.to,
                        ty: self.types.existing_element_type(key.edge_type.as_deref())?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.apply_batch(|graph| {
            let mut missing = 0;
            for change in staged {
                match change {
                    StagedChange::Create(edge) => {
                        graph.upsert_vertex(edge.from, edge.from_type, edge.from_props)?;
                        graph.upsert_vertex(edge.to, edge.to_type, edge.to_props)?;
                        graph.add_edge(edge.from, edge.to, edge.ty, edge.edge_props)?;
                    }
                    StagedChange::Delete { from, to, ty } => {
                        if !graph.delete_edge(from, to, ty) {
                            debug!(from = from.0, to = to.0, ty = ty.0, "engine.delete.missing");
                            missing += 1;
                        }
                    }
                }
            }
            Ok(missing)
        })
    }

    fn apply_batch<F>(&self, stage: F) -> Result<BatchSummary>
    where
        F: FnOnce(&mut VersionedGraph) -> Result<usize>,
    {
        let mut graph = self.graph.write();
        let outcome = stage(&mut graph).and_then(|missing| {
            let (emerged, deleted) = self.run_delta_queries(&graph)?;
            Ok(BatchSummary {
                emerged,
                deleted,
                missing_deletes: missing,
                finalize: FinalizeSummary::default(),
            })
        });
        match outcome {
            Ok(mut summary) => {
                summary.finalize = graph.finalize_changes();
                info!(
                    emerged = summary.emerged,
                    deleted = summary.deleted,
                    promoted = summary.finalize.promoted,
                    removed = summary.finalize.removed,
                    "engine.batch.applied"
                );
                Ok(summary)
            }
            Err(err) => {
                let touched = graph.rollback_changes();
                warn!(error = %err, touched, "engine.batch.rolled_back");
                Err(err)
            }
        }
    }

    fn run_delta_queries(&self, graph: &VersionedGraph) -> Result<(usize, usize)> {
        let queries = self.queries.lock();
        let (mut emerged, mut deleted) = (0, 0);
        for query in queries.iter() {
            let mut sink = query.plan.sink.lock();
            for delta in &query.plan.delta_queries {
                let ExecutionStats { rows, .. } = executor::execute(&delta.plan, graph, &mut *sink)?;
                match delta.plan.match_kind() {
                    MatchKind::Emerged => emerged += rows,
                    MatchKind::Deleted => deleted += rows,
                    MatchKind::Matched => {}
                }
                trace!(
                    handle = query.handle.0,
                    diff = delta.diff_relation,
                    polarity = %delta.polarity,
                    rows,
                    "engine.delta"
                );
            }
            if self.config.output.flush_each_batch {
                sink.flush()?;
            }
        }
        debug!(emerged, deleted, queries = queries.len(), "engine.batch.deltas");
        Ok((emerged, deleted))
    }

    fn resolve_output(&self, output: &OutputTarget) -> Result<SharedSink> {
        match output {
            OutputTarget::File(path) => Ok(shared(FileSink::open(path, self.config.output.format)?)),
            OutputTarget::Callback(name) => self
                .callbacks
                .lock()
                .get(name)
                .cloned()
                .ok_or_else(|| FlowError::InvalidOwned(format!("no callback registered as '{name}'"))),
        }
    }

    fn stage_create(&self, spec: &EdgeSpec) -> StagedEdge {
        StagedEdge {
            from: spec.from,
            from_type: self.types.type_id_or_insert(spec.from_type.as_deref()),
            from_props: self.props(&spec.from_props),
            to: spec.to,
            to_type: self.types.type_id_or_insert(spec.to_type.as_deref()),
            to_props: self.props(&spec.to_props),
            ty: self.types.element_type(spec.edge_type.as_deref()),
            edge_props: self.props(&spec.edge_props),
        }
    }

    fn props<'a>(
        &self,
        props: impl IntoIterator<Item = (&'a String, &'a Literal)>,
    ) -> Vec<(PropId, PropValue)> {
        props
            .into_iter()
            .map(|(key, value)| (self.types.prop_id_or_insert(key), PropValue::from(value)))
            .collect()
    }
}

// Batch input with every name resolved.
enum StagedChange {
    Create(StagedEdge),
    Delete {
        from: VertexId,
        to: VertexId,
        ty: TypeId,
    },
}

struct StagedEdge {
    from: VertexId,
    from_type: Option<TypeId>,
    from_props: Vec<(PropId, PropValue)>,
    to: VertexId,
    to_type: Option<TypeId>,
    to_props: Vec<(PropId, PropValue)>,
    ty: TypeId,
    edge_props: Vec<(PropId, PropValue)>,
}
