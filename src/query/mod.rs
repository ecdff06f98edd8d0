#![forbid(unsafe_code)]

//! Pattern model, planners and Generic Join execution.
//!
//! Patterns are built with [`QueryBuilder`], planned by
//! [`OneTimeMatchPlanner`] or [`ContinuousMatchPlanner`] into
//! pipeline descriptors, and run by [`executor::execute`].

/// Structured query values: patterns, predicates, CREATE and DELETE payloads.
pub mod ast;

/// Fluent construction of patterns and queries.
pub mod builder;

/// Structured planner errors.
pub mod errors;

/// Pull-based operators that run a one-time plan against a graph view.
pub mod executor;

/// Undirected adjacency over pattern variables.
pub mod graph;

/// Variable ordering heuristic.
pub mod order;

/// Plan descriptors and explain output.
pub mod physical;

/// One-time and continuous planners.
pub mod planner;

/// Opt-in operator timing counters.
pub mod profile;

pub use builder::{QueryBuilder, VarSpec};
pub use errors::PlanError;
pub use physical::{ContinuousMatchQueryPlan, DeltaQuery, OneTimeMatchQueryPlan, PlanExplain};
pub use planner::{ContinuousMatchPlanner, OneTimeMatchPlanner};
