use ahash::AHashSet;
use log::debug;
use serde::Serialize;

use crate::core::{FieldType, Row, SelectionKey, Value, cell};
use crate::selection::SelectedTable;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: FieldType,
    pub null_count: usize,
    pub distinct_count: usize,
    /// Non-null values consistent with `inferred_type`.
    pub consistent_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingValues,
    DuplicateRecords,
    TypeMismatch,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub column: Option<String>,
    pub description: String,
    pub affected_records: usize,
}

/// Quality figures are percentages in `[0, 100]`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfilingReport {
    pub key: SelectionKey,
    /// Rows actually profiled (the sample or loaded page).
    pub row_count: usize,
    /// Row count reported by the source.
    pub source_row_count: u64,
    pub column_count: usize,
    pub completeness: f64,
    pub uniqueness: f64,
    pub consistency: f64,
    pub quality_score: f64,
    pub columns: Vec<ColumnProfile>,
    pub issues: Vec<DataIssue>,
}

pub fn profile(tables: &[SelectedTable]) -> Vec<ProfilingReport> {
    tables.iter().map(profile_table).collect()
}

pub fn profile_table(table: &SelectedTable) -> ProfilingReport {
    let rows = &table.rows;
    let label = table.label();

    let columns: Vec<ColumnProfile> = table
        .metadata
        .fields
        .iter()
        .map(|f| profile_column(&f.name, f.inferred_type, rows))
        .collect();

    let row_count = rows.len();
    let cells = row_count * columns.len();
    let nulls: usize = columns.iter().map(|c| c.null_count).sum();
    let present = cells - nulls;
    let consistent: usize = columns.iter().map(|c| c.consistent_count).sum();

    let completeness = percent(cells - nulls, cells, 100.0);
    let consistency = percent(consistent, present, 100.0);
    let uniqueness = if row_count == 0 || columns.is_empty() {
        0.0
    } else {
        columns
            .iter()
            .map(|c| percent(c.distinct_count, row_count, 0.0).min(100.0))
            .sum::<f64>()
            / columns.len() as f64
    };

    let mut issues = Vec::new();
    for c in &columns {
        if c.null_count > 0 {
            issues.push(DataIssue {
                kind: IssueKind::MissingValues,
                severity: Severity::Warning,
                column: Some(c.name.clone()),
                description: format!("Missing values in {}.{}", label, c.name),
                affected_records: c.null_count,
            });
        }
    }
    let duplicates = count_duplicates(rows, &table.metadata.field_names());
    if duplicates > 0 {
        issues.push(DataIssue {
            kind: IssueKind::DuplicateRecords,
            severity: Severity::Warning,
            column: None,
            description: format!("Duplicate records in {}", label),
            affected_records: duplicates,
        });
    }
    for c in &columns {
        let mismatched = row_count - c.null_count - c.consistent_count;
        if mismatched > 0 {
            issues.push(DataIssue {
                kind: IssueKind::TypeMismatch,
                severity: Severity::Error,
                column: Some(c.name.clone()),
                description: format!("Data type mismatch in {}.{}", label, c.name),
                affected_records: mismatched,
            });
        }
    }

    debug!(
        "profiled {}: {} rows, {} columns, {} issues",
        table.key,
        row_count,
        columns.len(),
        issues.len()
    );

    ProfilingReport {
        key: table.key.clone(),
        row_count,
        source_row_count: table.metadata.row_count,
        column_count: columns.len(),
        completeness,
        uniqueness,
        consistency,
        quality_score: (completeness + uniqueness + consistency) / 3.0,
        columns,
        issues,
    }
}

fn percent(part: usize, whole: usize, empty: f64) -> f64 {
    if whole == 0 {
        empty
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn profile_column(name: &str, inferred_type: FieldType, rows: &[Row]) -> ColumnProfile {
    let mut null_count = 0;
    let mut consistent_count = 0;
    let mut distinct: AHashSet<&Value> = AHashSet::new();
    let numeric = inferred_type.is_numeric();
    let (mut sum, mut n) = (0.0, 0usize);
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);

    for row in rows {
        let v = cell(row, name);
        if v.is_null() {
            null_count += 1;
            continue;
        }
        distinct.insert(v);
        if v.matches_type(inferred_type) {
            consistent_count += 1;
        }
        if numeric && let Some(x) = v.as_f64() {
            sum += x;
            n += 1;
            min = min.min(x);
            max = max.max(x);
        }
    }

    let has_numbers = n > 0;
    ColumnProfile {
        name: name.to_string(),
        inferred_type,
        null_count,
        distinct_count: distinct.len(),
        consistent_count,
        min: has_numbers.then_some(min),
        max: has_numbers.then_some(max),
        mean: has_numbers.then(|| sum / n as f64),
    }
}

/// Rows that repeat an earlier row over the declared fields.
fn count_duplicates(rows: &[Row], fields: &[String]) -> usize {
    let mut seen: AHashSet<Vec<&Value>> = AHashSet::with_capacity(rows.len());
    rows.iter()
        .filter(|row| !seen.insert(fields.iter().map(|f| cell(row, f)).collect()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDescriptor, TableMetadata};

    fn table(fields: Vec<FieldDescriptor>, rows: Vec<Row>) -> SelectedTable {
        let metadata = TableMetadata {
            connection_id: "mongo".to_string(),
            database: "analytics".to_string(),
            table_name: "events".to_string(),
            fields,
            row_count: 1000,
            sample_rows: rows,
        };
        SelectedTable::new(metadata.key(), metadata)
    }

    fn row(id: Value, amount: Value) -> Row {
        Row::from_iter([("id".to_string(), id), ("amount".to_string(), amount)])
    }

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("id", FieldType::Integer, false),
            FieldDescriptor::new("amount", FieldType::Float, true),
        ]
    }

    #[test]
    fn test_profile_figures() {
        let t = table(
            fields(),
            vec![
                row(Value::Number(1.0), Value::Number(10.0)),
                row(Value::Number(2.0), Value::Null),
                row(Value::Number(3.0), Value::from("n/a")),
                row(Value::Number(3.0), Value::from("n/a")),
            ],
        );
        let report = profile_table(&t);

        assert_eq!(report.row_count, 4);
        assert_eq!(report.source_row_count, 1000);
        // 1 null out of 8 cells
        assert_eq!(report.completeness, 87.5);
        // id: 3/4, amount: 2/4
        assert_eq!(report.uniqueness, 62.5);
        // 7 present, 2 strings in a float column
        assert!((report.consistency - 500.0 / 7.0).abs() < 1e-9);
        assert!(
            (report.quality_score - (87.5 + 62.5 + 500.0 / 7.0) / 3.0).abs() < 1e-9
        );

        let amount = &report.columns[1];
        assert_eq!(amount.null_count, 1);
        assert_eq!(amount.distinct_count, 2);
        assert_eq!(amount.min, Some(10.0));
        assert_eq!(amount.mean, Some(10.0));

        let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::MissingValues,
                IssueKind::DuplicateRecords,
                IssueKind::TypeMismatch
            ]
        );
        assert_eq!(report.issues[1].affected_records, 1);
        assert_eq!(report.issues[2].affected_records, 2);
        assert_eq!(report.issues[2].description, "Data type mismatch in events.amount");
    }

    #[test]
    fn test_empty_table() {
        let report = profile_table(&table(fields(), Vec::new()));
        assert_eq!(report.completeness, 100.0);
        assert_eq!(report.consistency, 100.0);
        assert_eq!(report.uniqueness, 0.0);
        assert!(report.issues.is_empty());
        assert_eq!(report.columns[0].mean, None);
    }

    #[test]
    fn test_text_columns_have_no_numeric_stats() {
        let t = table(
            vec![FieldDescriptor::new("code", FieldType::String, false)],
            vec![Row::from_iter([("code".to_string(), Value::from("42"))])],
        );
        let report = profile_table(&t);
        assert_eq!(report.columns[0].min, None);
        assert_eq!(report.uniqueness, 100.0);
    }
}
