use serde::{Deserialize, Serialize};

use crate::core::{SelectionKey, Value};
use crate::join::{JoinCondition, JoinType, Operator};

use super::StepKind;

/// Typed configuration of a pipeline step; the `kind` tag selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepConfig {
    Filter(FilterConfig),
    #[serde(alias = "select")]
    SelectColumns(SelectConfig),
    Aggregate(AggregateConfig),
    Join(JoinStepConfig),
    Sort(SortConfig),
    Calculate(CalculateConfig),
    Pivot(PivotConfig),
    Clean(CleanConfig),
}

impl StepConfig {
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::Filter(_) => StepKind::Filter,
            StepConfig::SelectColumns(_) => StepKind::SelectColumns,
            StepConfig::Aggregate(_) => StepKind::Aggregate,
            StepConfig::Join(_) => StepKind::Join,
            StepConfig::Sort(_) => StepKind::Sort,
            StepConfig::Calculate(_) => StepKind::Calculate,
            StepConfig::Pivot(_) => StepKind::Pivot,
            StepConfig::Clean(_) => StepKind::Clean,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    #[default]
    All,
    Any,
}

/// Right-hand side of a predicate: a literal, or another column of the same row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Operand {
    Value(Value),
    Column(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub operand: Operand,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub combine: Combine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SelectConfig {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFn {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
            AggregateFn::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    #[serde(default)]
    pub group_by: Vec<String>,
    pub function: AggregateFn,
    /// Columns to reduce; defaults to every numeric column outside `group_by`.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct JoinStepConfig {
    pub right: SelectionKey,
    pub join_type: JoinType,
    #[serde(default)]
    pub conditions: Vec<JoinCondition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SortConfig {
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CalculateConfig {
    pub column: String,
    pub expression: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PivotConfig {
    /// Row identity columns; defaults to every column but the key and value.
    #[serde(default)]
    pub index: Option<Vec<String>>,
    pub key_column: String,
    pub value_column: String,
    /// Reduces cells hit more than once; without it the last value wins.
    #[serde(default)]
    pub aggregate: Option<AggregateFn>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "action", rename_all = "lowercase", deny_unknown_fields)]
pub enum NullPolicy {
    #[default]
    Keep,
    Drop {
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    Fill {
        value: Value,
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    #[serde(default)]
    pub nulls: NullPolicy,
    #[serde(default)]
    pub drop_duplicates: bool,
}
