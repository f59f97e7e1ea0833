use serde::{Deserialize, Serialize};

use crate::join::JoinType;
use crate::pipeline::StepKind;

use super::schema::{Row, SelectionKey};
use super::value::Value;

static NULL: Value = Value::Null;

/// How a dataset was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Table {
        key: SelectionKey,
    },
    Join {
        join_type: JoinType,
        left: String,
        right: String,
    },
    Step {
        step_id: u64,
        kind: StepKind,
        /// Table pulled in by a join step.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        joined: Option<SelectionKey>,
        parent: Box<Provenance>,
    },
}

/// Named columns over rows. Datasets are never modified once built: every
/// join or pipeline step produces a new one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
    row_count: usize,
    provenance: Provenance,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, provenance: Provenance) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            provenance,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Values of one column in row order; absent cells read as null.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().map(move |row| cell(row, name))
    }

    /// Row cells in column order.
    pub fn ordered_cells(&self, row: &Row) -> Vec<Value> {
        self.columns.iter().map(|c| cell(row, c).clone()).collect()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Row>, Provenance) {
        (self.columns, self.rows, self.provenance)
    }
}

pub fn cell<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&NULL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cells_read_as_null() {
        let mut row = Row::new();
        row.insert("a".to_string(), Value::Number(1.0));
        let ds = Dataset::new(
            vec!["a".to_string(), "b".to_string()],
            vec![row],
            Provenance::Table {
                key: SelectionKey::new("c", "d", "t"),
            },
        );
        assert_eq!(ds.row_count(), 1);
        assert_eq!(
            ds.ordered_cells(&ds.rows()[0]),
            vec![Value::Number(1.0), Value::Null]
        );
        assert_eq!(ds.column_values("b").next(), Some(&Value::Null));
    }
}
