//! Generic Join planners.
//!
//! [`OneTimeMatchPlanner`] orders the pattern variables and turns every
//! relation into an intersection rule over the committed graph.
//! [`ContinuousMatchPlanner`] repeats that once per relation and polarity,
//! reading the chosen relation from a diff version, the relations handled
//! before it from MERGED and those after it from PERMANENT. Summing the
//! resulting delta queries reproduces exactly the change in the result set.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::query::ast::{Pattern, PredicateOperand, PropertyRef, StructuredQuery};
use crate::query::errors::PlanError;
use crate::query::graph::QueryGraph;
use crate::query::order::{complete_order, order_variables};
use crate::query::physical::{
    ContinuousMatchQueryPlan, DeltaQuery, Direction, EdgeIntersectionRule, EdgeSlot,
    FilterOperand, FilterPredicate, GraphVersion, OneTimeMatchQueryPlan, OutputTail, Slot, Stage,
};
use crate::sink::SharedSink;
use crate::storage::{PropValue, TypeStore};
use crate::types::{FlowError, Result, TypeId};

/// Plans one-time MATCH queries over the PERMANENT version.
pub struct OneTimeMatchPlanner {
    types: Arc<TypeStore>,
}

impl OneTimeMatchPlanner {
    /// Planner resolving type names through `types`.
    pub fn new(types: Arc<TypeStore>) -> Self {
        Self { types }
    }

    /// Plans a [`StructuredQuery::Match`].
    pub fn plan(&self, query: &StructuredQuery) -> Result<OneTimeMatchQueryPlan> {
        match query {
            StructuredQuery::Match(pattern) => self.plan_pattern(pattern),
            other => Err(PlanError::UnexpectedOperation {
                planner: "one-time match",
                found: other.operation(),
            }
            .into()),
        }
    }

    /// Plans a bare pattern against the committed graph.
    pub fn plan_pattern(&self, pattern: &Pattern) -> Result<OneTimeMatchQueryPlan> {
        let ctx = PatternContext::new(pattern, &self.types)?;
        let order = order_variables(&ctx.graph);
        let plan = ctx.build(order, None, &|_| Ok(GraphVersion::Permanent))?;
        debug!(
            vars = plan.ordered_variables.len(),
            stages = plan.stages.len(),
            "planner.one_time"
        );
        Ok(plan)
    }
}

/// Plans CONTINUOUS MATCH queries into delta queries.
pub struct ContinuousMatchPlanner {
    types: Arc<TypeStore>,
}

impl ContinuousMatchPlanner {
    /// Planner resolving type names through `types`.
    pub fn new(types: Arc<TypeStore>) -> Self {
        Self { types }
    }

    /// Plans a [`StructuredQuery::ContinuousMatch`], wiring every delta query
    /// to `sink`.
    pub fn plan(&self, query: &StructuredQuery, sink: SharedSink) -> Result<ContinuousMatchQueryPlan> {
        match query {
            StructuredQuery::ContinuousMatch { pattern, .. } => self.plan_pattern(pattern, sink),
            other => Err(PlanError::UnexpectedOperation {
                planner: "continuous match",
                found: other.operation(),
            }
            .into()),
        }
    }

    /// Builds the two delta queries of every relation, in declaration order.
    pub fn plan_pattern(&self, pattern: &Pattern, sink: SharedSink) -> Result<ContinuousMatchQueryPlan> {
        let ctx = PatternContext::new(pattern, &self.types)?;
        let relation_count = pattern.relations.len();
        let (delta_queries, _) = (0..relation_count).try_fold(
            (Vec::with_capacity(2 * relation_count), RelationClassification::initial(relation_count)),
            |(mut deltas, classes), diff| -> Result<_> {
                let during = classes.without_permanent(diff);
                let rel = &pattern.relations[diff];
                let order = complete_order(&ctx.graph, vec![rel.from.clone(), rel.to.clone()]);
                for polarity in [GraphVersion::DiffPlus, GraphVersion::DiffMinus] {
                    let plan = ctx.build(order.clone(), Some((diff, polarity)), &|idx| {
                        during.version_of(idx)
                    })?;
                    trace!(diff, %polarity, order = ?plan.ordered_variables, "planner.delta");
                    deltas.push(DeltaQuery {
                        diff_relation: diff,
                        polarity,
                        plan,
                    });
                }
                Ok((deltas, during.with_merged(diff)))
            },
        )?;
        debug!(
            relations = relation_count,
            delta_queries = delta_queries.len(),
            "planner.continuous"
        );
        Ok(ContinuousMatchQueryPlan {
            delta_queries,
            relation_names: ctx.relation_names,
            variable_names: pattern.variable_names(),
            sink,
        })
    }
}

/// Which version each non-diff relation is read from while the diff loop
/// runs. Every step produces a new snapshot instead of mutating this one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RelationClassification {
    merged: BTreeSet<usize>,
    permanent: BTreeSet<usize>,
}

impl RelationClassification {
    /// Every relation starts out PERMANENT.
    pub fn initial(relations: usize) -> Self {
        Self {
            merged: BTreeSet::new(),
            permanent: (0..relations).collect(),
        }
    }

    /// Marks `relation` as no longer read in PERMANENT.
    pub fn without_permanent(&self, relation: usize) -> Self {
        let mut next = self.clone();
        next.permanent.remove(&relation);
        next
    }

    /// Marks `relation` as read in MERGED.
    pub fn with_merged(&self, relation: usize) -> Self {
        let mut next = self.clone();
        next.merged.insert(relation);
        next
    }

    /// Version of a non-diff relation. A relation in neither set means the
    /// planner lost track of it, which is fatal.
    pub fn version_of(&self, relation: usize) -> Result<GraphVersion> {
        if self.merged.contains(&relation) {
            Ok(GraphVersion::Merged)
        } else if self.permanent.contains(&relation) {
            Ok(GraphVersion::Permanent)
        } else {
            Err(FlowError::Invariant(format!(
                "relation {relation} is neither MERGED nor PERMANENT"
            )))
        }
    }
}

// Pattern-derived data shared by every plan built for one query.
struct PatternContext<'a> {
    pattern: &'a Pattern,
    types: &'a TypeStore,
    graph: QueryGraph,
    relation_names: Vec<String>,
    relation_types: Vec<Option<TypeId>>,
}

impl<'a> PatternContext<'a> {
    fn new(pattern: &'a Pattern, types: &'a TypeStore) -> Result<Self> {
        pattern.validate()?;
        let relation_types = pattern
            .relations
            .iter()
            .map(|rel| types.type_id_or_insert(rel.rel_type.as_deref()))
            .collect();
        Ok(Self {
            pattern,
            types,
            graph: QueryGraph::from_pattern(pattern),
            relation_names: pattern.relation_names(),
            relation_types,
        })
    }

    fn build(
        &self,
        order: Vec<String>,
        diff: Option<(usize, GraphVersion)>,
        version_of: &dyn Fn(usize) -> Result<GraphVersion>,
    ) -> Result<OneTimeMatchQueryPlan> {
        let relation_version = |idx: usize| -> Result<GraphVersion> {
            match diff {
                Some((diff_idx, polarity)) if diff_idx == idx => Ok(polarity),
                _ => version_of(idx),
            }
        };

        let mut stages: Vec<Stage> = Vec::with_capacity(order.len().saturating_sub(1));
        for (target_pos, target) in order.iter().enumerate().skip(1) {
            let mut stage = Stage::new();
            if target_pos == 1 {
                if let Some((diff_idx, polarity)) = diff {
                    stage.push(EdgeIntersectionRule::new(
                        0,
                        Direction::Forward,
                        polarity,
                        self.relation_types[diff_idx],
                    ));
                }
            }
            for (prefix_pos, prefix) in order.iter().take(target_pos).enumerate() {
                for rel_idx in self.graph.relations_between(prefix, target) {
                    if diff.is_some_and(|(diff_idx, _)| diff_idx == rel_idx) {
                        continue;
                    }
                    let direction = if self.pattern.relations[rel_idx].from == *prefix {
                        Direction::Forward
                    } else {
                        Direction::Backward
                    };
                    stage.push(EdgeIntersectionRule::new(
                        prefix_pos,
                        direction,
                        version_of(rel_idx)?,
                        self.relation_types[rel_idx],
                    ));
                }
            }
            stages.push(stage);
        }

        let position = |name: &str| -> Result<usize> {
            order
                .iter()
                .position(|var| var == name)
                .ok_or_else(|| FlowError::Invariant(format!("variable '{name}' missing from order")))
        };
        let edges = self
            .pattern
            .relations
            .iter()
            .enumerate()
            .map(|(idx, rel)| {
                Ok(EdgeSlot {
                    name: self.relation_names[idx].clone(),
                    from_slot: position(&rel.from)?,
                    to_slot: position(&rel.to)?,
                    edge_type: self.relation_types[idx],
                    version: relation_version(idx)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let vertex_columns = self
            .pattern
            .variables
            .iter()
            .map(|var| position(&var.name))
            .collect::<Result<Vec<_>>>()?;
        let slot_of = |prop: &PropertyRef| -> Result<Slot> {
            if let Ok(pos) = position(&prop.element) {
                return Ok(Slot::Vertex(pos));
            }
            self.relation_names
                .iter()
                .position(|name| *name == prop.element)
                .map(Slot::Edge)
                .ok_or_else(|| PlanError::unknown_var(prop.element.clone(), "predicate").into())
        };
        let predicates = self
            .pattern
            .predicates
            .iter()
            .map(|pred| {
                let right = match &pred.right {
                    PredicateOperand::Property(prop) => FilterOperand::Property {
                        slot: slot_of(prop)?,
                        prop: self.types.prop_id_or_insert(&prop.key),
                    },
                    PredicateOperand::Literal(lit) => FilterOperand::Literal(PropValue::from(lit)),
                };
                Ok(FilterPredicate {
                    slot: slot_of(&pred.left)?,
                    prop: self.types.prop_id_or_insert(&pred.left.key),
                    op: pred.op,
                    right,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let variable_types = order
            .iter()
            .map(|var| {
                self.types
                    .type_id_or_insert(self.pattern.variable_type(var))
            })
            .collect();

        Ok(OneTimeMatchQueryPlan {
            ordered_variables: order,
            variable_types,
            stages,
            tail: OutputTail {
                edges,
                predicates,
                vertex_columns,
            },
        })
    }
}
