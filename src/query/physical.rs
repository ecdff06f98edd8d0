//! Plan values produced by the planners.
//!
//! Plans are pipeline descriptors. The executor turns them into live operator
//! streams at run time, so a plan can be executed any number of times.

use std::fmt;
use std::hash::Hasher;

use xxhash_rust::xxh64::Xxh64;

use crate::query::ast::ComparisonOp;
use crate::sink::{MatchKind, SharedSink};
use crate::storage::PropValue;
use crate::types::{PropId, TypeId};

pub use crate::storage::{Direction, GraphVersion};

/// One neighbor list of an intersection: read the adjacency of the vertex
/// bound at `prefix_index`, in `direction`, through `version`, keeping edges
/// of `edge_type` (any type when `None`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct EdgeIntersectionRule {
    /// Position of the bound vertex in the prefix.
    pub prefix_index: usize,
    /// Adjacency list to read.
    pub direction: Direction,
    /// Graph version the list is read in.
    pub version: GraphVersion,
    /// Edge type filter, `None` for any type.
    pub edge_type: Option<TypeId>,
}

impl EdgeIntersectionRule {
    /// Rule reading `version` from prefix slot `prefix_index`.
    pub fn new(
        prefix_index: usize,
        direction: Direction,
        version: GraphVersion,
        edge_type: Option<TypeId>,
    ) -> Self {
        Self {
            prefix_index,
            direction,
            version,
            edge_type,
        }
    }
}

impl fmt::Display for EdgeIntersectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, ",
            self.prefix_index,
            self.direction.as_str(),
            self.version
        )?;
        match self.edge_type {
            Some(ty) => write!(f, "type={ty})"),
            None => write!(f, "type=any)"),
        }
    }
}

/// Rules whose neighbor lists are intersected to extend a prefix by one
/// variable. Empty only when the next variable starts a new component.
pub type Stage = Vec<EdgeIntersectionRule>;

/// Position of a bound element in the tuple flowing through the tail.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Slot {
    /// Index into the ordered vertex prefix.
    Vertex(usize),
    /// Index into the resolved edge slots.
    Edge(usize),
}

/// Relation whose concrete edge id is resolved after all variables are bound.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct EdgeSlot {
    /// Relation name, user-supplied or generated.
    pub name: String,
    /// Ordered slot of the relation's source variable.
    pub from_slot: usize,
    /// Ordered slot of the relation's destination variable.
    pub to_slot: usize,
    /// Edge type filter, `None` for any type.
    pub edge_type: Option<TypeId>,
    /// Version the relation was matched in.
    pub version: GraphVersion,
}

/// Right-hand side of a compiled predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterOperand {
    /// Another property of the same row.
    Property {
        /// Element the property is read from.
        slot: Slot,
        /// Property read.
        prop: PropId,
    },
    /// Constant.
    Literal(PropValue),
}

/// Property predicate compiled against tuple slots.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterPredicate {
    /// Element whose property is compared.
    pub slot: Slot,
    /// Property on the left-hand side.
    pub prop: PropId,
    /// Comparison operator.
    pub op: ComparisonOp,
    /// Right-hand side.
    pub right: FilterOperand,
}

/// Everything downstream of the last Extend: edge-id resolution, optional
/// filtering and the column mapping of the sink adapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputTail {
    /// Edge slots in relation declaration order.
    pub edges: Vec<EdgeSlot>,
    /// Predicates; the Filter operator is only built when non-empty.
    pub predicates: Vec<FilterPredicate>,
    /// `vertex_columns[i]` is the ordered slot emitted as output column `i`.
    pub vertex_columns: Vec<usize>,
}

/// Generic Join plan for one pattern over fixed graph versions.
#[derive(Clone, Debug, PartialEq)]
pub struct OneTimeMatchQueryPlan {
    /// Variables in evaluation order.
    pub ordered_variables: Vec<String>,
    /// Declared type of each ordered variable.
    pub variable_types: Vec<Option<TypeId>>,
    /// `stages[i]` extends the first `i + 1` variables by the next one.
    pub stages: Vec<Stage>,
    /// Edge resolution, predicates and output columns.
    pub tail: OutputTail,
}

impl OneTimeMatchQueryPlan {
    /// Version read by the scan, which decides the kind of emitted rows.
    pub fn scan_version(&self) -> GraphVersion {
        self.stages
            .first()
            .and_then(|stage| stage.first())
            .map(|rule| rule.version)
            .unwrap_or(GraphVersion::Permanent)
    }

    /// Kind of row this plan reports.
    pub fn match_kind(&self) -> MatchKind {
        match self.scan_version() {
            GraphVersion::DiffPlus => MatchKind::Emerged,
            GraphVersion::DiffMinus => MatchKind::Deleted,
            GraphVersion::Permanent | GraphVersion::Merged => MatchKind::Matched,
        }
    }

    /// Operator tree and stable hash of this plan.
    pub fn explain(&self) -> PlanExplain {
        let root = explain_pipeline(self);
        PlanExplain {
            plan_hash: hash_plan(self),
            root,
        }
    }
}

/// Delta query: one plan with one relation read from a diff version.
#[derive(Clone, Debug, PartialEq)]
pub struct DeltaQuery {
    /// Index of the diff relation in declaration order.
    pub diff_relation: usize,
    /// [`GraphVersion::DiffPlus`] or [`GraphVersion::DiffMinus`].
    pub polarity: GraphVersion,
    /// Generic Join plan for this delta.
    pub plan: OneTimeMatchQueryPlan,
}

/// Delta queries maintaining one standing pattern, sharing one sink.
#[derive(Clone)]
pub struct ContinuousMatchQueryPlan {
    /// Two entries per relation: DIFF_PLUS then DIFF_MINUS, in relation order.
    pub delta_queries: Vec<DeltaQuery>,
    /// Relation names used by the edge-id resolver.
    pub relation_names: Vec<String>,
    /// Output column names for vertices.
    pub variable_names: Vec<String>,
    /// Destination of every delta's rows.
    pub sink: SharedSink,
}

impl fmt::Debug for ContinuousMatchQueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousMatchQueryPlan")
            .field("delta_queries", &self.delta_queries)
            .field("relation_names", &self.relation_names)
            .field("variable_names", &self.variable_names)
            .finish_non_exhaustive()
    }
}

impl ContinuousMatchQueryPlan {
    /// Number of delta queries.
    pub fn len(&self) -> usize {
        self.delta_queries.len()
    }

    /// `true` when the plan has no delta queries.
    pub fn is_empty(&self) -> bool {
        self.delta_queries.is_empty()
    }

    /// One subtree per delta query, hashed together.
    pub fn explain(&self) -> PlanExplain {
        let mut root = ExplainNode::new("ContinuousMatch");
        root.props
            .push(ExplainProp::plain("relations", self.relation_names.join(",")));
        let mut hasher = Xxh64::new(0);
        for delta in &self.delta_queries {
            let mut child = explain_pipeline(&delta.plan);
            child.props.insert(
                0,
                ExplainProp::plain("diff", format!("{}:{}", delta.diff_relation, delta.polarity)),
            );
            root.inputs.push(child);
            hasher.write_u64(hash_plan(&delta.plan));
        }
        PlanExplain {
            root,
            plan_hash: hasher.finish(),
        }
    }
}

/// Human-readable explain tree.
#[derive(Clone, Debug)]
pub struct PlanExplain {
    /// Top of the operator tree.
    pub root: ExplainNode,
    /// Deterministic hash of the plan shape.
    pub plan_hash: u64,
}

impl fmt::Display for PlanExplain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan_hash={:016x}", self.plan_hash)?;
        self.root.render(f, 0)
    }
}

/// Explain node representing an operator with optional metadata.
#[derive(Clone, Debug)]
pub struct ExplainNode {
    /// Operator name.
    pub op: String,
    /// Operator settings, in display order.
    pub props: Vec<ExplainProp>,
    /// Upstream operators.
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Node without properties or children.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.op, indent = depth * 2)?;
        for prop in &self.props {
            write!(f, " {}={}", prop.key, prop.value)?;
        }
        writeln!(f)?;
        for input in &self.inputs {
            input.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug)]
pub struct ExplainProp {
    /// Setting name.
    pub key: String,
    /// Rendered value.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

// Sink at the root, Scan at the leaf.
fn explain_pipeline(plan: &OneTimeMatchQueryPlan) -> ExplainNode {
    let mut node = ExplainNode::new("Scan");
    if let Some(stage) = plan.stages.first() {
        node.props.push(ExplainProp::plain(
            "vars",
            plan.ordered_variables
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
        ));
        node.props.push(ExplainProp::plain("rules", describe_stage(stage)));
    }
    for (idx, stage) in plan.stages.iter().enumerate().skip(1) {
        let mut extend = ExplainNode::new("Extend");
        if let Some(target) = plan.ordered_variables.get(idx + 1) {
            extend.props.push(ExplainProp::plain("to", target.clone()));
        }
        extend
            .props
            .push(ExplainProp::plain("rules", describe_stage(stage)));
        extend.inputs.push(node);
        node = extend;
    }
    let mut resolver = ExplainNode::new("EdgeIdResolver");
    resolver.props.push(ExplainProp::plain(
        "edges",
        plan.tail
            .edges
            .iter()
            .map(|edge| format!("{}@{}", edge.name, edge.version))
            .collect::<Vec<_>>()
            .join(","),
    ));
    resolver.inputs.push(node);
    node = resolver;
    if !plan.tail.predicates.is_empty() {
        let mut filter = ExplainNode::new("Filter");
        for pred in &plan.tail.predicates {
            filter
                .props
                .push(ExplainProp::literal("predicate", describe_predicate(pred)));
        }
        filter.inputs.push(node);
        node = filter;
    }
    let mut sink = ExplainNode::new("Sink");
    sink.props
        .push(ExplainProp::plain("kind", plan.match_kind().as_str()));
    sink.inputs.push(node);
    sink
}

fn describe_stage(stage: &Stage) -> String {
    if stage.is_empty() {
        return "[all vertices]".to_owned();
    }
    let rules: Vec<String> = stage.iter().map(ToString::to_string).collect();
    format!("[{}]", rules.join(" "))
}

fn describe_slot(slot: Slot) -> String {
    match slot {
        Slot::Vertex(idx) => format!("v{idx}"),
        Slot::Edge(idx) => format!("e{idx}"),
    }
}

fn describe_predicate(pred: &FilterPredicate) -> String {
    let right = match &pred.right {
        FilterOperand::Property { slot, prop } => format!("{}.{}", describe_slot(*slot), prop),
        FilterOperand::Literal(value) => format!("{value:?}"),
    };
    format!(
        "{}.{} {} {}",
        describe_slot(pred.slot),
        pred.prop,
        pred.op.symbol(),
        right
    )
}

fn hash_plan(plan: &OneTimeMatchQueryPlan) -> u64 {
    let mut hasher = Xxh64::new(0);
    for var in &plan.ordered_variables {
        hasher.write(var.as_bytes());
        hasher.write_u8(0);
    }
    for ty in &plan.variable_types {
        hash_type(*ty, &mut hasher);
    }
    for stage in &plan.stages {
        hasher.write_usize(stage.len());
        for rule in stage {
            hasher.write_usize(rule.prefix_index);
            hasher.write_u8(rule.direction as u8);
            hasher.write_u8(rule.version as u8);
            hash_type(rule.edge_type, &mut hasher);
        }
    }
    for edge in &plan.tail.edges {
        hasher.write(edge.name.as_bytes());
        hasher.write_usize(edge.from_slot);
        hasher.write_usize(edge.to_slot);
        hasher.write_u8(edge.version as u8);
    }
    hasher.write_usize(plan.tail.predicates.len());
    for col in &plan.tail.vertex_columns {
        hasher.write_usize(*col);
    }
    hasher.finish()
}

fn hash_type(ty: Option<TypeId>, hasher: &mut Xxh64) {
    match ty {
        Some(ty) => {
            hasher.write_u8(1);
            hasher.write_u32(ty.0);
        }
        None => hasher.write_u8(0),
    }
}
