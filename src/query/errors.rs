#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// Structured errors emitted while validating and planning a pattern.
///
/// These are caller errors: the pattern itself cannot be planned. Internal
/// planner/executor disagreements are reported as
/// [`FlowError::Invariant`](crate::types::FlowError::Invariant) instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// The pattern contains no relations, so there is nothing to join.
    #[error("pattern must contain at least one relation")]
    NoRelations,
    /// A relation connects a variable to itself.
    #[error("relation '{relation}' connects '{var}' to itself; self loops are not plannable")]
    SelfLoop { relation: String, var: String },
    /// A variable was declared twice with conflicting types.
    #[error("variable '{var}' declared with conflicting types '{first}' and '{second}'")]
    ConflictingVariableType {
        var: String,
        first: String,
        second: String,
    },
    /// A relation name was bound more than once.
    #[error("duplicate relation name '{name}'")]
    DuplicateRelationName { name: String },
    /// A relation name shadows a vertex variable.
    #[error("relation name '{name}' is also used as a vertex variable")]
    RelationShadowsVariable { name: String },
    /// A variable is declared but no relation touches it.
    #[error("variable '{var}' is not used by any relation")]
    IsolatedVariable { var: String },
    /// A predicate referenced a variable or relation that is not in the pattern.
    #[error("unknown variable '{var}' referenced in {context}")]
    UnknownVariable { var: String, context: &'static str },
    /// The planner was handed a query of the wrong kind.
    #[error("{planner} planner cannot plan a {found} query")]
    UnexpectedOperation {
        planner: &'static str,
        found: &'static str,
    },
}

impl PlanError {
    /// Builds a [`PlanError::UnknownVariable`] for a specific context.
    pub fn unknown_var(var: impl Into<String>, context: &'static str) -> Self {
        PlanError::UnknownVariable {
            var: var.into(),
            context,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::NoRelations => "NoRelations",
            PlanError::SelfLoop { .. } => "SelfLoop",
            PlanError::ConflictingVariableType { .. } => "ConflictingVariableType",
            PlanError::DuplicateRelationName { .. } => "DuplicateRelationName",
            PlanError::RelationShadowsVariable { .. } => "RelationShadowsVariable",
            PlanError::IsolatedVariable { .. } => "IsolatedVariable",
            PlanError::UnknownVariable { .. } => "UnknownVariable",
            PlanError::UnexpectedOperation { .. } => "UnexpectedOperation",
        }
    }
}

/// Convenience wrapper that formats planner errors with their codes.
pub struct PlanErrorWithCode<'a>(pub &'a PlanError);

impl fmt::Display for PlanErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
