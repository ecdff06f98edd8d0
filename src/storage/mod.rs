//! Graph storage services.
//!
//! Holds the in-memory versioned graph the executor reads through logical
//! versions, and the type/property-key catalog shared across planners.

/// Type and property-key dictionaries.
pub mod catalog;

mod adjacency;
mod graph;
mod options;
mod types;

/// Adjacency traversal direction.
pub use adjacency::Direction;

/// Versioned graph store and its batch bookkeeping.
pub use graph::{EdgeState, FinalizeSummary, GraphVersion, VersionedGraph};

/// Graph construction options.
pub use options::GraphOptions;

/// Property values and element records.
pub use types::{prop_get, EdgeData, PropMap, PropValue, VertexData};

pub use catalog::TypeStore;
