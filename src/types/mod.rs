#![forbid(unsafe_code)]

//! Identifiers and the crate-wide error type shared by the planner, the
//! executor and the storage services.

use std::fmt;

use crate::query::errors::PlanError;

/// Identifier of a vertex in the data graph.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, serde::Serialize)]
pub struct VertexId(pub u64);
/// Stable identifier of an edge, assigned when the edge is first staged.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Serialize)]
pub struct EdgeId(pub u64);
/// Interned vertex or edge type. The default value is [`TypeId::DEFAULT`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct TypeId(pub u32);
/// Interned property key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PropId(pub u32);

impl TypeId {
    /// Type carried by vertices and edges created without an explicit type.
    pub const DEFAULT: TypeId = TypeId(0);
}

/// Errors surfaced by planning, execution and the storage services.
#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    /// File sink or config file I/O.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// Caller supplied a value the operation cannot use.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Same as `Invalid`, with a formatted message.
    #[error("invalid argument: {0}")]
    InvalidOwned(String),
    /// A named item does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// Type name looked up without interning.
    #[error("unknown type '{0}'")]
    UnknownType(String),
    /// Property key looked up without interning.
    #[error("unknown property key '{0}'")]
    UnknownProperty(String),
    /// Planner and executor disagree about the shape of a plan. Fatal for the
    /// batch being processed.
    #[error("invariant violated: {0}")]
    Invariant(String),
    /// Pattern rejected by validation or planning.
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),
    /// Configuration could not be parsed or written.
    #[error("configuration error: {0}")]
    Config(String),
    /// JSON encoding of a row failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VertexId {
    fn from(value: u64) -> Self {
        VertexId(value)
    }
}

impl From<VertexId> for u64 {
    fn from(value: VertexId) -> Self {
        value.0
    }
}

impl From<u32> for TypeId {
    fn from(value: u32) -> Self {
        TypeId(value)
    }
}

impl From<TypeId> for u32 {
    fn from(value: TypeId) -> Self {
        value.0
    }
}

impl From<u32> for PropId {
    fn from(value: u32) -> Self {
        PropId(value)
    }
}

impl From<PropId> for u32 {
    fn from(value: PropId) -> Self {
        value.0
    }
}
