//! Row-filter clauses
//!
//! A where-clause is a sequence of [`Clause`] values that are ANDed together.
//! On the wire each clause keeps the JSON shape callers already send:
//!
//! ```json
//! {"column": "age", "operator": ">", "value": 25}
//! {"and": [ ... ]}
//! {"or": [ ... ]}
//! {"raw": "created_at > date('now', '-1 day')"}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::validate_identifier;

/// Comparison operator of a leaf condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Like => "like",
            Operator::NotLike => "not like",
        }
    }

    /// `in` / `not in` take a list, everything else a scalar
    pub fn expects_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        match normalized.as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Gte),
            "<=" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "not in" => Ok(Operator::NotIn),
            "like" => Ok(Operator::Like),
            "not like" => Ok(Operator::NotLike),
            _ => Err(Error::InvalidClause(format!("unsupported operator '{}'", s))),
        }
    }
}

impl Serialize for Operator {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A `column operator value` triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value: value.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_identifier(&self.column)?;

        match (&self.value, self.operator) {
            (Value::Array(_), op) if op.expects_list() => Ok(()),
            (_, op) if op.expects_list() => Err(Error::InvalidClause(format!(
                "operator '{}' on column '{}' requires a list value",
                op, self.column
            ))),
            (Value::Array(_) | Value::Object(_), op) => Err(Error::InvalidClause(format!(
                "operator '{}' on column '{}' requires a scalar value",
                op, self.column
            ))),
            (Value::Null, Operator::Eq | Operator::Ne) => Ok(()),
            (Value::Null, op) => Err(Error::InvalidClause(format!(
                "operator '{}' on column '{}' cannot compare against null",
                op, self.column
            ))),
            _ => Ok(()),
        }
    }
}

/// One row-filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClauseRepr", into = "ClauseRepr")]
pub enum Clause {
    Leaf(Condition),
    And(Vec<Clause>),
    Or(Vec<Clause>),
    /// Literal SQL fragment, passed to the backend untouched
    Raw(String),
}

impl Clause {
    /// Shorthand for a leaf condition
    pub fn leaf(column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Clause::Leaf(Condition::new(column, operator, value))
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::leaf(column, Operator::Eq, value)
    }

    /// Check operator/value shapes and column names, recursively
    pub fn validate(&self) -> Result<()> {
        match self {
            Clause::Leaf(condition) => condition.validate(),
            Clause::And(clauses) | Clause::Or(clauses) => {
                if clauses.is_empty() {
                    return Err(Error::InvalidClause(
                        "'and'/'or' groups must contain at least one clause".to_string(),
                    ));
                }
                clauses.iter().try_for_each(Clause::validate)
            }
            Clause::Raw(fragment) => {
                if fragment.trim().is_empty() {
                    Err(Error::InvalidClause("raw clause is empty".to_string()))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Whether a literal SQL fragment appears anywhere in the clause
    pub fn contains_raw(&self) -> bool {
        match self {
            Clause::Leaf(_) => false,
            Clause::And(clauses) | Clause::Or(clauses) => clauses.iter().any(Clause::contains_raw),
            Clause::Raw(_) => true,
        }
    }

    /// Column names referenced by leaf conditions
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Clause::Leaf(condition) => vec![condition.column.as_str()],
            Clause::And(clauses) | Clause::Or(clauses) => {
                clauses.iter().flat_map(Clause::columns).collect()
            }
            Clause::Raw(_) => vec![],
        }
    }
}

/// Validate every clause of a where sequence
pub fn validate_clauses(clauses: &[Clause]) -> Result<()> {
    clauses.iter().try_for_each(Clause::validate)
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ClauseRepr {
    And { and: Vec<Clause> },
    Or { or: Vec<Clause> },
    Raw { raw: String },
    Leaf(Condition),
}

impl From<ClauseRepr> for Clause {
    fn from(repr: ClauseRepr) -> Self {
        match repr {
            ClauseRepr::And { and } => Clause::And(and),
            ClauseRepr::Or { or } => Clause::Or(or),
            ClauseRepr::Raw { raw } => Clause::Raw(raw),
            ClauseRepr::Leaf(condition) => Clause::Leaf(condition),
        }
    }
}

impl From<Clause> for ClauseRepr {
    fn from(clause: Clause) -> Self {
        match clause {
            Clause::Leaf(condition) => ClauseRepr::Leaf(condition),
            Clause::And(and) => ClauseRepr::And { and },
            Clause::Or(or) => ClauseRepr::Or { or },
            Clause::Raw(raw) => ClauseRepr::Raw { raw },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf() {
        let clause: Clause =
            serde_json::from_value(json!({"column": "age", "operator": ">", "value": 25})).unwrap();
        assert_eq!(clause, Clause::leaf("age", Operator::Gt, 25));
    }

    #[test]
    fn test_parse_composites() {
        let clause: Clause = serde_json::from_value(json!({
            "or": [
                {"column": "status", "operator": "=", "value": "active"},
                {"and": [
                    {"column": "age", "operator": "NOT IN", "value": [1, 2]},
                    {"raw": "score > 10"}
                ]}
            ]
        }))
        .unwrap();

        let Clause::Or(items) = &clause else {
            panic!("expected or group");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            Clause::And(vec![
                Clause::leaf("age", Operator::NotIn, json!([1, 2])),
                Clause::Raw("score > 10".to_string()),
            ])
        );
        assert_eq!(clause.columns(), vec!["status", "age"]);
    }

    #[test]
    fn test_serialize_keeps_wire_shape() {
        let clause = Clause::And(vec![Clause::eq("user_id", 7)]);
        let value = serde_json::to_value(&clause).unwrap();
        assert_eq!(
            value,
            json!({"and": [{"column": "user_id", "operator": "=", "value": 7}]})
        );
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let parsed: std::result::Result<Clause, _> =
            serde_json::from_value(json!({"column": "a", "operator": "~", "value": 1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_leaf_requires_value_key() {
        let parsed: std::result::Result<Clause, _> =
            serde_json::from_value(json!({"column": "a", "operator": "="}));
        assert!(parsed.is_err());

        let explicit: Clause =
            serde_json::from_value(json!({"column": "a", "operator": "=", "value": null})).unwrap();
        assert_eq!(explicit, Clause::eq("a", Value::Null));
    }

    #[test]
    fn test_contains_raw() {
        assert!(!Clause::eq("a", 1).contains_raw());
        assert!(Clause::Raw("a = 1".into()).contains_raw());
        assert!(Clause::And(vec![
            Clause::eq("a", 1),
            Clause::Or(vec![Clause::Raw("b = 2".into())]),
        ])
        .contains_raw());
    }

    #[test]
    fn test_list_operators_need_arrays() {
        assert!(Clause::leaf("id", Operator::In, json!([1, 2])).validate().is_ok());
        assert!(matches!(
            Clause::leaf("id", Operator::In, 1).validate(),
            Err(Error::InvalidClause(_))
        ));
        assert!(matches!(
            Clause::leaf("id", Operator::Eq, json!([1])).validate(),
            Err(Error::InvalidClause(_))
        ));
    }

    #[test]
    fn test_null_only_with_equality() {
        assert!(Clause::eq("deleted_at", Value::Null).validate().is_ok());
        assert!(Clause::leaf("deleted_at", Operator::Gt, Value::Null)
            .validate()
            .is_err());
    }

    #[test]
    fn test_empty_groups_rejected() {
        assert!(Clause::Or(vec![]).validate().is_err());
        assert!(Clause::Raw("  ".into()).validate().is_err());
    }

    #[test]
    fn test_bad_column_rejected() {
        assert!(matches!(
            Clause::eq("id; --", 1).validate(),
            Err(Error::InvalidIdentifier(_))
        ));
    }
}
