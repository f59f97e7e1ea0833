use std::fmt::Write;

use arrow::datatypes::DataType;

use crate::convert::column_data_type;
use crate::core::{Dataset, Value};

const ROWS_PER_INSERT: usize = 500;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: &DataType) -> &'static str {
    match data_type {
        DataType::Int64 => "BIGINT",
        DataType::Float64 => "DOUBLE PRECISION",
        DataType::Boolean => "BOOLEAN",
        DataType::Timestamp(_, _) => "TIMESTAMP",
        _ => "TEXT",
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) if n.is_finite() => value.to_string(),
        Value::Number(_) => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d %H:%M:%S%.f")),
    }
}

/// Portable `CREATE TABLE` plus batched `INSERT` statements.
pub(super) fn dump(dataset: &Dataset, table: &str) -> String {
    let mut out = String::new();
    let table = quote_ident(table);

    let definitions: Vec<String> = dataset
        .columns()
        .iter()
        .map(|c| {
            let data_type = column_data_type(dataset.column_values(c));
            format!("  {} {}", quote_ident(c), sql_type(&data_type))
        })
        .collect();
    let _ = writeln!(out, "CREATE TABLE {} (\n{}\n);", table, definitions.join(",\n"));

    let column_list = dataset
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    for chunk in dataset.rows().chunks(ROWS_PER_INSERT) {
        let _ = writeln!(out, "INSERT INTO {} ({}) VALUES", table, column_list);
        let tuples: Vec<String> = chunk
            .iter()
            .map(|row| {
                let values: Vec<String> =
                    dataset.ordered_cells(row).iter().map(literal).collect();
                format!("  ({})", values.join(", "))
            })
            .collect();
        let _ = writeln!(out, "{};", tuples.join(",\n"));
    }
    out
}
