use std::cmp::Ordering;

use ahash::{AHashMap, AHashSet};

use crate::core::{Dataset, JunctionError, Provenance, Row, Value, cell};
use crate::join::{JoinInput, join_inputs};
use crate::selection::SelectionSet;

use super::TransformationStep;
use super::config::{
    AggregateConfig, AggregateFn, CalculateConfig, CleanConfig, Combine, FilterConfig,
    JoinStepConfig, NullPolicy, Operand, PivotConfig, SelectConfig, SortConfig, SortDirection,
    StepConfig,
};
use super::expr::Expr;

type Columns = Vec<String>;
type Rows = Vec<Row>;

/// Runs one step over `input` and wraps the result in a new dataset.
pub(crate) fn apply(
    step: &TransformationStep,
    input: &Dataset,
    selection: &SelectionSet,
) -> Result<Dataset, JunctionError> {
    let id = step.id;
    let (columns, rows) = match &step.config {
        StepConfig::Filter(c) => filter(id, input, c)?,
        StepConfig::SelectColumns(c) => select(id, input, c)?,
        StepConfig::Aggregate(c) => aggregate(id, input, c)?,
        StepConfig::Join(c) => join(input, selection, c)?,
        StepConfig::Sort(c) => sort(id, input, c)?,
        StepConfig::Calculate(c) => calculate(id, input, c)?,
        StepConfig::Pivot(c) => pivot(id, input, c)?,
        StepConfig::Clean(c) => clean(id, input, c)?,
    };
    let joined = match &step.config {
        StepConfig::Join(c) => Some(c.right.clone()),
        _ => None,
    };
    Ok(Dataset::new(
        columns,
        rows,
        Provenance::Step {
            step_id: id,
            kind: step.kind,
            joined,
            parent: Box::new(input.provenance().clone()),
        },
    ))
}

fn require(step: u64, input: &Dataset, column: &str) -> Result<(), JunctionError> {
    if input.has_column(column) {
        Ok(())
    } else {
        Err(JunctionError::StepReferenceError {
            step,
            message: format!("unknown column '{}'", column),
        })
    }
}

fn require_all<'a>(
    step: u64,
    input: &Dataset,
    columns: impl IntoIterator<Item = &'a String>,
) -> Result<(), JunctionError> {
    columns
        .into_iter()
        .try_for_each(|c| require(step, input, c))
}

fn execution(step: u64, message: String) -> JunctionError {
    JunctionError::StepExecutionError { step, message }
}

fn filter(step: u64, input: &Dataset, config: &FilterConfig) -> Result<(Columns, Rows), JunctionError> {
    for p in &config.predicates {
        require(step, input, &p.column)?;
        if let Operand::Column(other) = &p.operand {
            require(step, input, other)?;
        }
    }
    if config.predicates.is_empty() {
        return Ok((input.columns().to_vec(), input.rows().to_vec()));
    }

    let holds = |row: &Row| {
        let mut results = config.predicates.iter().map(|p| {
            let right = match &p.operand {
                Operand::Value(v) => v,
                Operand::Column(c) => cell(row, c),
            };
            p.operator.apply(cell(row, &p.column), right)
        });
        match config.combine {
            Combine::All => results.all(|hit| hit),
            Combine::Any => results.any(|hit| hit),
        }
    };

    let rows = input.rows().iter().filter(|r| holds(*r)).cloned().collect();
    Ok((input.columns().to_vec(), rows))
}

fn select(step: u64, input: &Dataset, config: &SelectConfig) -> Result<(Columns, Rows), JunctionError> {
    require_all(step, input, &config.columns)?;

    let mut columns: Columns = Vec::with_capacity(config.columns.len());
    for c in &config.columns {
        if !columns.contains(c) {
            columns.push(c.clone());
        }
    }
    let rows = input
        .rows()
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| (c.clone(), cell(row, c).clone()))
                .collect()
        })
        .collect();
    Ok((columns, rows))
}

/// A column counts as numeric when it holds at least one value and every
/// non-null value reads as a number.
fn is_numeric_column(input: &Dataset, column: &str) -> bool {
    let mut seen = false;
    for v in input.column_values(column).filter(|v| !v.is_null()) {
        if v.as_f64().is_none() {
            return false;
        }
        seen = true;
    }
    seen
}

/// Reduces the values of one group. Nulls are skipped; an empty input gives
/// null, except for `count`.
fn reduce(func: AggregateFn, values: &[&Value]) -> Result<Value, String> {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();
    match func {
        AggregateFn::Count => Ok(Value::Number(present.len() as f64)),
        AggregateFn::Sum | AggregateFn::Avg => {
            if present.is_empty() {
                return Ok(Value::Null);
            }
            let mut total = 0.0;
            for v in &present {
                total += v
                    .as_f64()
                    .ok_or_else(|| format!("cannot {} non-numeric value '{}'", func.name(), v))?;
            }
            if func == AggregateFn::Avg {
                total /= present.len() as f64;
            }
            Ok(Value::Number(total))
        }
        AggregateFn::Min => Ok(present
            .into_iter()
            .min_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
        AggregateFn::Max => Ok(present
            .into_iter()
            .max_by(|a, b| a.sort_cmp(b))
            .cloned()
            .unwrap_or(Value::Null)),
    }
}

/// Groups rows by the values of `keys`, in first-appearance order.
fn group_rows<'a>(rows: &'a [Row], keys: &[String]) -> Vec<(Vec<Value>, Vec<&'a Row>)> {
    let mut index: AHashMap<Vec<Value>, usize> = AHashMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
    for row in rows {
        let key: Vec<Value> = keys.iter().map(|k| cell(row, k).clone()).collect();
        match index.get(&key) {
            Some(&i) => groups[i].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups
}

fn aggregate(
    step: u64,
    input: &Dataset,
    config: &AggregateConfig,
) -> Result<(Columns, Rows), JunctionError> {
    require_all(step, input, &config.group_by)?;
    let targets: Vec<String> = match &config.columns {
        Some(columns) => {
            require_all(step, input, columns)?;
            columns.clone()
        }
        None => input
            .columns()
            .iter()
            .filter(|c| !config.group_by.contains(c) && is_numeric_column(input, c))
            .cloned()
            .collect(),
    };

    let outputs: Vec<String> = targets
        .iter()
        .map(|c| format!("{}_{}", config.function.name(), c))
        .collect();
    let mut columns = config.group_by.clone();
    columns.extend(outputs.iter().cloned());

    let mut rows = Vec::new();
    for (key, members) in group_rows(input.rows(), &config.group_by) {
        let mut out: Row = config.group_by.iter().cloned().zip(key).collect();
        for (target, name) in targets.iter().zip(&outputs) {
            let values: Vec<&Value> = members.iter().map(|r| cell(r, target)).collect();
            let reduced = reduce(config.function, &values)
                .map_err(|e| execution(step, format!("column '{}': {}", target, e)))?;
            out.insert(name.clone(), reduced);
        }
        rows.push(out);
    }
    Ok((columns, rows))
}

fn join(
    input: &Dataset,
    selection: &SelectionSet,
    config: &JoinStepConfig,
) -> Result<(Columns, Rows), JunctionError> {
    let right = selection.require(&config.right)?;
    let output = join_inputs(
        JoinInput::verbatim(input.columns().to_vec(), input.rows()),
        JoinInput::qualified(right.label(), right.metadata.field_names(), &right.rows),
        config.join_type,
        &config.conditions,
    )?;
    Ok((output.columns, output.rows))
}

fn sort(step: u64, input: &Dataset, config: &SortConfig) -> Result<(Columns, Rows), JunctionError> {
    for key in &config.keys {
        require(step, input, &key.column)?;
    }
    let mut rows = input.rows().to_vec();
    rows.sort_by(|a, b| {
        for key in &config.keys {
            let (x, y) = (cell(a, &key.column), cell(b, &key.column));
            let ordering = match (x.is_null(), y.is_null()) {
                (false, false) => {
                    let o = x.compare(y).unwrap_or(Ordering::Equal);
                    match key.direction {
                        SortDirection::Asc => o,
                        SortDirection::Desc => o.reverse(),
                    }
                }
                // nulls last in either direction
                _ => x.sort_cmp(y),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok((input.columns().to_vec(), rows))
}

fn calculate(
    step: u64,
    input: &Dataset,
    config: &CalculateConfig,
) -> Result<(Columns, Rows), JunctionError> {
    if config.column.trim().is_empty() {
        return Err(execution(step, "calculated column needs a name".to_string()));
    }
    let expr = Expr::parse(&config.expression).map_err(|e| execution(step, e.to_string()))?;
    for column in expr.columns() {
        require(step, input, column)?;
    }

    let mut rows = Vec::with_capacity(input.row_count());
    for (i, row) in input.rows().iter().enumerate() {
        let value = expr
            .eval(row)
            .map_err(|e| execution(step, format!("row {}: {}", i + 1, e)))?;
        let mut out = row.clone();
        out.insert(config.column.clone(), value);
        rows.push(out);
    }

    let mut columns = input.columns().to_vec();
    if !input.has_column(&config.column) {
        columns.push(config.column.clone());
    }
    Ok((columns, rows))
}

fn pivot(step: u64, input: &Dataset, config: &PivotConfig) -> Result<(Columns, Rows), JunctionError> {
    require(step, input, &config.key_column)?;
    require(step, input, &config.value_column)?;
    let index: Vec<String> = match &config.index {
        Some(index) => {
            require_all(step, input, index)?;
            index.clone()
        }
        None => input
            .columns()
            .iter()
            .filter(|c| **c != config.key_column && **c != config.value_column)
            .cloned()
            .collect(),
    };

    // pivoted columns never shadow an index column or each other
    let mut key_names: Vec<String> = Vec::new();
    let mut renamed: AHashMap<String, String> = AHashMap::new();
    let mut taken: AHashSet<String> = index.iter().cloned().collect();
    let mut rows = Vec::new();

    for (key, members) in group_rows(input.rows(), &index) {
        let mut cells: AHashMap<String, Vec<&Value>> = AHashMap::new();
        for row in members {
            let pivot_key = cell(row, &config.key_column);
            // rows without a key still keep their index row, but fill no cell
            if pivot_key.is_null() {
                continue;
            }
            let key_text = pivot_key.to_string();
            let name = match renamed.get(&key_text) {
                Some(name) => name.clone(),
                None => {
                    let mut name = key_text.clone();
                    while !taken.insert(name.clone()) {
                        name.push_str("_2");
                    }
                    key_names.push(name.clone());
                    renamed.insert(key_text, name.clone());
                    name
                }
            };
            cells
                .entry(name)
                .or_default()
                .push(cell(row, &config.value_column));
        }

        let mut out: Row = index.iter().cloned().zip(key).collect();
        for (name, values) in cells {
            let value = match config.aggregate {
                Some(func) => reduce(func, &values)
                    .map_err(|e| execution(step, format!("pivot cell '{}': {}", name, e)))?,
                None => values.last().map(|v| (*v).clone()).unwrap_or(Value::Null),
            };
            out.insert(name, value);
        }
        rows.push(out);
    }

    let mut columns = index;
    columns.extend(key_names);
    Ok((columns, rows))
}

fn clean(step: u64, input: &Dataset, config: &CleanConfig) -> Result<(Columns, Rows), JunctionError> {
    let scope = |columns: &Option<Vec<String>>| -> Result<Vec<String>, JunctionError> {
        match columns {
            Some(columns) => {
                require_all(step, input, columns)?;
                Ok(columns.clone())
            }
            None => Ok(input.columns().to_vec()),
        }
    };

    let mut rows: Rows = match &config.nulls {
        NullPolicy::Keep => input.rows().to_vec(),
        NullPolicy::Drop { columns } => {
            let columns = scope(columns)?;
            input
                .rows()
                .iter()
                .filter(|row| columns.iter().all(|c| !cell(row, c).is_null()))
                .cloned()
                .collect()
        }
        NullPolicy::Fill { value, columns } => {
            let columns = scope(columns)?;
            input
                .rows()
                .iter()
                .map(|row| {
                    let mut out = row.clone();
                    for c in &columns {
                        if cell(row, c).is_null() {
                            out.insert(c.clone(), value.clone());
                        }
                    }
                    out
                })
                .collect()
        }
    };

    if config.drop_duplicates {
        let mut seen: AHashSet<Vec<Value>> = AHashSet::new();
        rows.retain(|row| seen.insert(input.ordered_cells(row)));
    }
    Ok((input.columns().to_vec(), rows))
}
