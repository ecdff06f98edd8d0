use std::fmt;

use smallvec::SmallVec;

use crate::query::ast::Literal;
use crate::types::{PropId, TypeId, VertexId};

/// Property value stored on a vertex or edge.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// Owned string.
    Str(String),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => write!(f, "null"),
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<&Literal> for PropValue {
    fn from(value: &Literal) -> Self {
        match value {
            Literal::Null => PropValue::Null,
            Literal::Bool(v) => PropValue::Bool(*v),
            Literal::Int(v) => PropValue::Int(*v),
            Literal::Float(v) => PropValue::Float(*v),
            Literal::String(v) => PropValue::Str(v.clone()),
        }
    }
}

/// Properties of one element, kept sorted by key.
pub type PropMap = SmallVec<[(PropId, PropValue); 4]>;

/// Reads `prop` from a sorted property map.
pub fn prop_get(props: &PropMap, prop: PropId) -> Option<&PropValue> {
    props
        .binary_search_by_key(&prop, |(id, _)| *id)
        .ok()
        .map(|idx| &props[idx].1)
}

/// Writes `prop`, replacing any previous value.
pub fn prop_set(props: &mut PropMap, prop: PropId, value: PropValue) {
    match props.binary_search_by_key(&prop, |(id, _)| *id) {
        Ok(idx) => props[idx].1 = value,
        Err(idx) => props.insert(idx, (prop, value)),
    }
}

/// Vertex record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexData {
    /// Vertex type, [`TypeId::DEFAULT`] unless set explicitly.
    pub ty: TypeId,
    /// Vertex properties.
    pub props: PropMap,
}

/// Edge record.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeData {
    /// Source vertex.
    pub src: VertexId,
    /// Destination vertex.
    pub dst: VertexId,
    /// Edge type.
    pub ty: TypeId,
    /// Edge properties.
    pub props: PropMap,
}
