//! Continuous subgraph matching over a versioned in-memory graph.
//!
//! Standing patterns are compiled into one delta query per relation and
//! polarity. Every CREATE or DELETE batch runs those delta queries over the
//! batch's diff views and reports matches that emerged or disappeared.

#![deny(missing_docs)]

/// Engine configuration.
pub mod config;
/// Engine facade and batch application.
pub mod engine;
/// Patterns, planners and execution.
pub mod query;
/// Destinations for matched rows.
pub mod sink;
/// Versioned graph storage and the type catalog.
pub mod storage;
/// Identifiers and the crate error type.
pub mod types;

pub use config::EngineConfig;
pub use engine::{BatchSummary, EdgeChange, Engine, ExecuteOutcome, QueryHandle};
pub use query::QueryBuilder;
pub use sink::{MatchKind, MatchRow, OutputSink, SharedSink};
pub use types::{FlowError, Result};
pub use query::profile::{profile_snapshot, QueryProfileSnapshot};
