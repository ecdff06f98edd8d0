//! Structured query model consumed by the planners.
//!
//! A query arrives here already parsed: the textual pattern language is
//! translated elsewhere (or built with [`QueryBuilder`](super::QueryBuilder))
//! into a [`StructuredQuery`] value. Planners treat that value as immutable.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::query::errors::PlanError;
use crate::types::VertexId;

/// Suffix appended to the ordinal of every relation that has no user-supplied
/// name. The edge-id resolver addresses relations by these names.
pub const ANON_RELATION_SUFFIX: &str = "_anon_rel";

/// A vertex variable of a pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryVariable {
    /// Variable name, unique within its pattern.
    pub name: String,
    /// Declared vertex type, `None` matches any type.
    pub var_type: Option<String>,
}

/// A directed relation between two pattern variables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QueryRelation {
    /// Source variable name.
    pub from: String,
    /// Destination variable name.
    pub to: String,
    /// Edge type constraint, `None` matches any type.
    pub rel_type: Option<String>,
    /// Optional name binding the matched edge.
    pub name: Option<String>,
}

impl QueryRelation {
    /// Creates an unnamed relation.
    pub fn new(from: impl Into<String>, to: impl Into<String>, rel_type: Option<&str>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            rel_type: rel_type.map(str::to_owned),
            name: None,
        }
    }

    /// Returns `true` when the relation joins `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// Comparison operators usable in property predicates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl ComparisonOp {
    /// Symbol used in explain output.
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

/// Reference to a property of a vertex variable or of a named relation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyRef {
    /// Vertex variable name or relation name.
    pub element: String,
    /// Property key.
    pub key: String,
}

impl PropertyRef {
    /// Creates a property reference.
    pub fn new(element: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            key: key.into(),
        }
    }
}

/// Right-hand side of a property predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum PredicateOperand {
    /// Another bound property.
    Property(PropertyRef),
    /// A literal value.
    Literal(Literal),
}

/// Property predicate such as `a.age > 30` or `a.city = b.city`.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyPredicate {
    /// Property tested.
    pub left: PropertyRef,
    /// Comparison applied.
    pub op: ComparisonOp,
    /// Value or property compared against.
    pub right: PredicateOperand,
}

/// Literal values surfaced by the query model.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer value.
    Int(i64),
    /// 64-bit floating point value.
    Float(f64),
    /// String value.
    String(String),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A graph pattern: variables, relations between them and property
/// predicates over the bound elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    /// Vertex variables in first-appearance order.
    pub variables: Vec<QueryVariable>,
    /// Relations in declaration order. Parallel relations are kept distinct.
    pub relations: Vec<QueryRelation>,
    /// Property predicates applied after all variables are bound.
    pub predicates: Vec<PropertyPredicate>,
}

impl Pattern {
    /// Looks up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&QueryVariable> {
        self.variables.iter().find(|var| var.name == name)
    }

    /// Declared type of `name`, `None` if the variable is untyped or unknown.
    pub fn variable_type(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(|var| var.var_type.as_deref())
    }

    /// Names of the vertex variables in first-appearance order. This is the
    /// column order of every result row produced for the pattern.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|var| var.name.clone()).collect()
    }

    /// Names of every relation in declaration order. Unnamed relations are
    /// named `{ordinal}{ANON_RELATION_SUFFIX}` where the ordinal counts
    /// unnamed relations only, so repeated calls return the same names.
    pub fn relation_names(&self) -> Vec<String> {
        let mut anonymous = 0usize;
        self.relations
            .iter()
            .map(|rel| match &rel.name {
                Some(name) => name.clone(),
                None => {
                    let name = format!("{anonymous}{ANON_RELATION_SUFFIX}");
                    anonymous += 1;
                    name
                }
            })
            .collect()
    }

    /// Checks the structural rules planners rely on.
    pub fn validate(&self) -> std::result::Result<(), PlanError> {
        if self.relations.is_empty() {
            return Err(PlanError::NoRelations);
        }
        let known: HashSet<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        let mut rel_names = HashSet::new();
        for (idx, rel) in self.relations.iter().enumerate() {
            for endpoint in [&rel.from, &rel.to] {
                if !known.contains(endpoint.as_str()) {
                    return Err(PlanError::unknown_var(endpoint.clone(), "relation"));
                }
            }
            if rel.from == rel.to {
                return Err(PlanError::SelfLoop {
                    relation: rel.name.clone().unwrap_or_else(|| format!("#{idx}")),
                    var: rel.from.clone(),
                });
            }
            if let Some(name) = &rel.name {
                if known.contains(name.as_str()) {
                    return Err(PlanError::RelationShadowsVariable { name: name.clone() });
                }
                if !rel_names.insert(name.as_str()) {
                    return Err(PlanError::DuplicateRelationName { name: name.clone() });
                }
            }
        }
        // Generated names share the namespace with explicit ones.
        if let Some(clash) = self
            .relations
            .iter()
            .zip(self.relation_names())
            .find(|(rel, name)| rel.name.is_none() && rel_names.contains(name.as_str()))
        {
            return Err(PlanError::DuplicateRelationName { name: clash.1 });
        }
        if let Some(isolated) = self
            .variables
            .iter()
            .find(|var| !self.relations.iter().any(|rel| rel.from == var.name || rel.to == var.name))
        {
            return Err(PlanError::IsolatedVariable {
                var: isolated.name.clone(),
            });
        }
        let relation_names = self.relation_names();
        for pred in &self.predicates {
            let mut refs = vec![&pred.left];
            if let PredicateOperand::Property(right) = &pred.right {
                refs.push(right);
            }
            for prop in refs {
                let is_var = known.contains(prop.element.as_str());
                let is_rel = relation_names.iter().any(|name| *name == prop.element);
                if !is_var && !is_rel {
                    return Err(PlanError::unknown_var(prop.element.clone(), "predicate"));
                }
            }
        }
        Ok(())
    }
}

/// Where a continuous query delivers its result deltas.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OutputTarget {
    /// Append rows to a file.
    File(PathBuf),
    /// Deliver rows to a callback registered with the engine under this name.
    Callback(String),
}

/// Edge to stage in a CREATE batch. Vertex types and properties are applied
/// to the endpoints as part of the same batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeSpec {
    /// Source vertex.
    pub from: VertexId,
    /// Source vertex type, if it should be set.
    pub from_type: Option<String>,
    /// Destination vertex.
    pub to: VertexId,
    /// Destination vertex type, if it should be set.
    pub to_type: Option<String>,
    /// Edge type; untyped edges get the default type.
    pub edge_type: Option<String>,
    /// Properties written to the source vertex.
    pub from_props: BTreeMap<String, Literal>,
    /// Properties written to the destination vertex.
    pub to_props: BTreeMap<String, Literal>,
    /// Properties written to the edge.
    pub edge_props: BTreeMap<String, Literal>,
}

impl EdgeSpec {
    /// Creates an edge spec without types or properties.
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from: VertexId(from),
            to: VertexId(to),
            ..Self::default()
        }
    }

    /// Sets the edge type.
    pub fn typed(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    /// Sets both endpoint types.
    pub fn with_vertex_types(
        mut self,
        from_type: impl Into<String>,
        to_type: impl Into<String>,
    ) -> Self {
        self.from_type = Some(from_type.into());
        self.to_type = Some(to_type.into());
        self
    }

    /// Adds an edge property.
    pub fn with_edge_prop(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.edge_props.insert(key.into(), value.into());
        self
    }

    /// Adds a property to the source vertex.
    pub fn with_from_prop(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.from_props.insert(key.into(), value.into());
        self
    }

    /// Adds a property to the destination vertex.
    pub fn with_to_prop(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.to_props.insert(key.into(), value.into());
        self
    }
}

/// Edge to remove in a DELETE batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeKey {
    /// Source vertex.
    pub from: VertexId,
    /// Destination vertex.
    pub to: VertexId,
    /// Edge type; `None` addresses the default type.
    pub edge_type: Option<String>,
}

impl EdgeKey {
    /// Creates an edge key.
    pub fn new(from: u64, to: u64, edge_type: Option<&str>) -> Self {
        Self {
            from: VertexId(from),
            to: VertexId(to),
            edge_type: edge_type.map(str::to_owned),
        }
    }
}

/// Parsed query handed to the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredQuery {
    /// One-time match over the committed graph.
    Match(Pattern),
    /// Standing match whose result deltas are delivered to `output`.
    ContinuousMatch {
        /// Pattern to maintain.
        pattern: Pattern,
        /// Destination of the deltas.
        output: OutputTarget,
    },
    /// Adds edges as one batch.
    Create(Vec<EdgeSpec>),
    /// Removes edges as one batch.
    Delete(Vec<EdgeKey>),
}

impl StructuredQuery {
    /// Operation name used in logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            StructuredQuery::Match(_) => "MATCH",
            StructuredQuery::ContinuousMatch { .. } => "CONTINUOUS MATCH",
            StructuredQuery::Create(_) => "CREATE",
            StructuredQuery::Delete(_) => "DELETE",
        }
    }
}
