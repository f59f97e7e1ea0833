mod nested_loop;

use std::cmp::Ordering;
use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::{Dataset, JunctionError, Provenance, SelectionKey, Value};
use crate::selection::SelectionSet;

pub use nested_loop::{JoinInput, JoinOutput, join_inputs};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinType {
    fn keeps_unmatched_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    fn keeps_unmatched_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
            JoinType::Cross => "CROSS",
        };
        write!(f, "{}", name)
    }
}

/// Comparison operator shared by join conditions and filter predicates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=", alias = "≠", alias = "<>")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=", alias = "≥")]
    Ge,
    #[serde(rename = "<=", alias = "≤")]
    Le,
}

impl Operator {
    /// Evaluates `left <op> right` under the shared coercion rules. A null
    /// operand or an undefined numeric comparison is false.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        let Some(ordering) = left.compare(right) else {
            return false;
        };
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JoinCondition {
    pub left_column: String,
    pub right_column: String,
    #[serde(default)]
    pub operator: Operator,
}

impl JoinCondition {
    pub fn new(left_column: &str, operator: Operator, right_column: &str) -> Self {
        Self {
            left_column: left_column.to_string(),
            right_column: right_column.to_string(),
            operator,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JoinSpec {
    pub left: SelectionKey,
    pub right: SelectionKey,
    pub join_type: JoinType,
    #[serde(default)]
    pub conditions: Vec<JoinCondition>,
}

/// Joins two selected tables over their rows in scope.
pub fn execute(spec: &JoinSpec, selection: &SelectionSet) -> Result<Dataset, JunctionError> {
    let left = selection.require(&spec.left)?;
    let right = selection.require(&spec.right)?;

    let output = join_inputs(
        JoinInput::qualified(left.label(), left.metadata.field_names(), &left.rows),
        JoinInput::qualified(right.label(), right.metadata.field_names(), &right.rows),
        spec.join_type,
        &spec.conditions,
    )?;

    info!(
        "{} join of '{}' and '{}' produced {} rows",
        spec.join_type,
        spec.left,
        spec.right,
        output.rows.len()
    );

    Ok(Dataset::new(
        output.columns,
        output.rows,
        Provenance::Join {
            join_type: spec.join_type,
            left: spec.left.to_string(),
            right: spec.right.to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_coercion() {
        assert!(Operator::Eq.apply(&Value::from("1"), &Value::Number(1.0)));
        assert!(Operator::Gt.apply(&Value::from("10"), &Value::from("9")));
        assert!(Operator::Lt.apply(&Value::from("2024-01-02"), &Value::from("2024-01-10")));
        assert!(Operator::Lt.apply(&Value::from("apple"), &Value::from("banana")));
        assert!(!Operator::Eq.apply(&Value::Null, &Value::Null));
        assert!(!Operator::Ne.apply(&Value::Null, &Value::Number(1.0)));
        assert!(!Operator::Eq.apply(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_operator_serde_symbols() {
        let ops: Vec<Operator> = serde_json::from_str(r#"["=", "≠", ">=", "≤", "<"]"#).unwrap();
        assert_eq!(
            ops,
            vec![Operator::Eq, Operator::Ne, Operator::Ge, Operator::Le, Operator::Lt]
        );
        assert_eq!(serde_json::to_string(&Operator::Ne).unwrap(), r#""!=""#);
    }

    #[test]
    fn test_join_spec_deserialize() {
        let spec: JoinSpec = serde_json::from_str(
            r#"{
                "left": {"connection_id": "pg", "database": "production", "table_name": "orders"},
                "right": {"connection_id": "mysql", "database": "crm", "table_name": "users"},
                "join_type": "LEFT",
                "conditions": [{"left_column": "user_id", "right_column": "id"}]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.join_type, JoinType::Left);
        assert_eq!(spec.conditions[0].operator, Operator::Eq);
    }
}
