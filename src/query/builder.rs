//! Fluent pattern builder.
//!
//! Errors are deferred: the first problem is remembered and returned by
//! [`QueryBuilder::build`], so call chains never need intermediate `?`.

use crate::query::ast::{
    ComparisonOp, Literal, OutputTarget, Pattern, PredicateOperand, PropertyPredicate,
    PropertyRef, QueryRelation, QueryVariable, StructuredQuery,
};
use crate::query::errors::PlanError;
use crate::types::{FlowError, Result};

/// Vertex endpoint of a relation: a variable name with an optional type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VarSpec {
    /// Variable name.
    pub name: String,
    /// Declared type.
    pub var_type: Option<String>,
}

impl From<&str> for VarSpec {
    /// Parses `"a"` or `"a:Person"`.
    fn from(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((name, ty)) => VarSpec {
                name: name.to_owned(),
                var_type: Some(ty.to_owned()),
            },
            None => VarSpec {
                name: spec.to_owned(),
                var_type: None,
            },
        }
    }
}

impl From<(&str, &str)> for VarSpec {
    fn from((name, ty): (&str, &str)) -> Self {
        VarSpec {
            name: name.to_owned(),
            var_type: Some(ty.to_owned()),
        }
    }
}

impl From<PropertyRef> for PredicateOperand {
    fn from(prop: PropertyRef) -> Self {
        PredicateOperand::Property(prop)
    }
}

impl From<Literal> for PredicateOperand {
    fn from(value: Literal) -> Self {
        PredicateOperand::Literal(value)
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(impl From<$ty> for PredicateOperand {
            fn from(value: $ty) -> Self {
                PredicateOperand::Literal(Literal::from(value))
            }
        })*
    };
}

literal_operand!(&str, String, bool, i64, f64);

/// Fluent builder producing a validated [`Pattern`].
#[derive(Default)]
pub struct QueryBuilder {
    pattern: Pattern,
    error: Option<FlowError>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an unnamed relation `from -> to`, `rel_type = None` meaning any type.
    pub fn edge<F, T>(self, from: F, to: T, rel_type: Option<&str>) -> Self
    where
        F: Into<VarSpec>,
        T: Into<VarSpec>,
    {
        self.relation(from.into(), to.into(), rel_type, None)
    }

    /// Adds a named relation; the name can be used in predicates and binds the
    /// matched edge id in result rows.
    pub fn named_edge<F, T>(self, name: &str, from: F, to: T, rel_type: Option<&str>) -> Self
    where
        F: Into<VarSpec>,
        T: Into<VarSpec>,
    {
        self.relation(from.into(), to.into(), rel_type, Some(name.to_owned()))
    }

    /// Adds a predicate `element.key op right`.
    pub fn where_prop<R>(mut self, element: &str, key: &str, op: ComparisonOp, right: R) -> Self
    where
        R: Into<PredicateOperand>,
    {
        if self.error.is_some() {
            return self;
        }
        self.pattern.predicates.push(PropertyPredicate {
            left: PropertyRef::new(element, key),
            op,
            right: right.into(),
        });
        self
    }

    /// Finishes the pattern, running structural validation.
    pub fn build(self) -> Result<Pattern> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.pattern.validate()?;
        Ok(self.pattern)
    }

    /// Finishes a one-time MATCH query.
    pub fn build_match(self) -> Result<StructuredQuery> {
        Ok(StructuredQuery::Match(self.build()?))
    }

    /// Finishes a CONTINUOUS MATCH query delivering to `output`.
    pub fn build_continuous(self, output: OutputTarget) -> Result<StructuredQuery> {
        Ok(StructuredQuery::ContinuousMatch {
            pattern: self.build()?,
            output,
        })
    }

    fn relation(
        mut self,
        from: VarSpec,
        to: VarSpec,
        rel_type: Option<&str>,
        name: Option<String>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let from_name = from.name.clone();
        let to_name = to.name.clone();
        for spec in [from, to] {
            if let Err(err) = self.declare(spec) {
                self.error = Some(err.into());
                return self;
            }
        }
        self.pattern.relations.push(QueryRelation {
            from: from_name,
            to: to_name,
            rel_type: rel_type.map(str::to_owned),
            name,
        });
        self
    }

    fn declare(&mut self, spec: VarSpec) -> std::result::Result<(), PlanError> {
        match self
            .pattern
            .variables
            .iter_mut()
            .find(|var| var.name == spec.name)
        {
            Some(existing) => match (&existing.var_type, spec.var_type) {
                (Some(first), Some(second)) if *first != second => {
                    Err(PlanError::ConflictingVariableType {
                        var: spec.name,
                        first: first.clone(),
                        second,
                    })
                }
                (None, Some(ty)) => {
                    existing.var_type = Some(ty);
                    Ok(())
                }
                _ => Ok(()),
            },
            None => {
                self.pattern.variables.push(QueryVariable {
                    name: spec.name,
                    var_type: spec.var_type,
                });
                Ok(())
            }
        }
    }
}
