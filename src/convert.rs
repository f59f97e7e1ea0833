//! Conversions between Arrow record batches and the row model used by the
//! composition engine. File sources are decoded through here, and exports
//! encode datasets back into Arrow before handing them to a writer.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit, TimestampMicrosecondType};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use arrow::util::display::array_value_to_string;

use crate::core::{Dataset, FieldDescriptor, FieldType, JunctionError, Row, Value};

pub fn field_type(data_type: &DataType) -> FieldType {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => FieldType::String,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => FieldType::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => FieldType::Float,
        DataType::Boolean => FieldType::Boolean,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => FieldType::Date,
        DataType::Struct(_) | DataType::List(_) | DataType::LargeList(_) | DataType::Map(_, _) => {
            FieldType::Object
        }
        _ => FieldType::String,
    }
}

pub fn schema_fields(schema: &Schema) -> Vec<FieldDescriptor> {
    schema
        .fields()
        .iter()
        .map(|f| FieldDescriptor::new(f.name(), field_type(f.data_type()), f.is_nullable()))
        .collect()
}

/// Decodes every row of a batch into name-keyed rows.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>, JunctionError> {
    let schema = batch.schema();
    let mut rows: Vec<Row> = (0..batch.num_rows()).map(|_| Row::new()).collect();

    for (i, field) in schema.fields().iter().enumerate() {
        let values = column_values(batch.column(i))?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(field.name().clone(), value);
        }
    }
    Ok(rows)
}

fn column_values(array: &ArrayRef) -> Result<Vec<Value>, JunctionError> {
    let len = array.len();
    let values = match field_type(array.data_type()) {
        FieldType::Integer | FieldType::Float => {
            let floats = cast(array, &DataType::Float64)?;
            let floats = floats.as_primitive::<arrow::datatypes::Float64Type>();
            (0..len)
                .map(|i| {
                    if floats.is_null(i) {
                        Value::Null
                    } else {
                        Value::Number(floats.value(i))
                    }
                })
                .collect()
        }
        FieldType::Boolean => {
            let bools = array.as_boolean();
            (0..len)
                .map(|i| {
                    if bools.is_null(i) {
                        Value::Null
                    } else {
                        Value::Bool(bools.value(i))
                    }
                })
                .collect()
        }
        FieldType::Date => {
            let ts = cast(array, &DataType::Timestamp(TimeUnit::Microsecond, None))?;
            let ts = ts.as_primitive::<TimestampMicrosecondType>();
            (0..len)
                .map(|i| {
                    if ts.is_null(i) {
                        Value::Null
                    } else {
                        ts.value_as_datetime(i).map(Value::Date).unwrap_or(Value::Null)
                    }
                })
                .collect()
        }
        FieldType::String | FieldType::Object => (0..len)
            .map(|i| {
                if array.is_null(i) {
                    Ok(Value::Null)
                } else {
                    array_value_to_string(array.as_ref(), i).map(Value::String)
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(values)
}

/// Arrow type that can hold every non-null value of a column without loss.
pub(crate) fn column_data_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for value in values {
        let dt = match value {
            Value::Null => continue,
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9e15 => DataType::Int64,
            Value::Number(_) => DataType::Float64,
            Value::Bool(_) => DataType::Boolean,
            Value::Date(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
            Value::String(_) => return DataType::Utf8,
        };
        seen = match (seen, dt) {
            (None, dt) => Some(dt),
            (Some(a), b) if a == b => Some(a),
            (Some(DataType::Int64), DataType::Float64)
            | (Some(DataType::Float64), DataType::Int64) => Some(DataType::Float64),
            _ => return DataType::Utf8,
        };
    }
    seen.unwrap_or(DataType::Utf8)
}

/// Encodes a dataset as a single record batch, one typed column per dataset
/// column. Mixed columns fall back to text.
pub fn dataset_to_batch(dataset: &Dataset) -> Result<RecordBatch, JunctionError> {
    let mut fields = Vec::with_capacity(dataset.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(dataset.columns().len());

    for name in dataset.columns() {
        let data_type = column_data_type(dataset.column_values(name));
        let values = dataset.column_values(name);
        let array: ArrayRef = match &data_type {
            DataType::Int64 => Arc::new(
                values
                    .map(|v| v.as_f64().map(|n| n as i64))
                    .collect::<Int64Array>(),
            ),
            DataType::Float64 => Arc::new(values.map(Value::as_f64).collect::<Float64Array>()),
            DataType::Boolean => Arc::new(values.map(Value::as_bool).collect::<BooleanArray>()),
            DataType::Timestamp(_, _) => Arc::new(
                values
                    .map(|v| v.as_date().map(|d| d.and_utc().timestamp_micros()))
                    .collect::<TimestampMicrosecondArray>(),
            ),
            _ => Arc::new(
                values
                    .map(|v| if v.is_null() { None } else { Some(v.to_string()) })
                    .collect::<StringArray>(),
            ),
        };
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let options = RecordBatchOptions::new().with_row_count(Some(dataset.row_count()));
    let batch = RecordBatch::try_new_with_options(Arc::new(Schema::new(fields)), arrays, &options)?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Provenance, SelectionKey, parse_date};
    use arrow::array::{Date32Array, Int32Array};

    fn dataset(columns: &[&str], rows: Vec<Vec<(&str, Value)>>) -> Dataset {
        Dataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.into_iter()
                .map(|r| r.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
                .collect(),
            Provenance::Table {
                key: SelectionKey::new("c", "d", "t"),
            },
        )
    }

    #[test]
    fn test_batch_to_rows_reads_typed_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("day", DataType::Date32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("ann"), None])),
                Arc::new(Date32Array::from(vec![Some(19_736), None])),
            ],
        )
        .unwrap();

        let rows = batch_to_rows(&batch).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::Number(1.0));
        assert_eq!(rows[0]["name"], Value::from("ann"));
        assert_eq!(rows[0]["day"], Value::Date(parse_date("2024-01-14").unwrap()));
        assert_eq!(rows[1]["name"], Value::Null);
        assert_eq!(rows[1]["day"], Value::Null);
    }

    #[test]
    fn test_dataset_to_batch_picks_column_types() {
        let ds = dataset(
            &["id", "amount", "label", "mixed"],
            vec![
                vec![
                    ("id", Value::Number(1.0)),
                    ("amount", Value::Number(1.5)),
                    ("label", Value::from("a")),
                    ("mixed", Value::Number(1.0)),
                ],
                vec![
                    ("id", Value::Number(2.0)),
                    ("amount", Value::Number(2.0)),
                    ("mixed", Value::Bool(true)),
                ],
            ],
        );
        let batch = dataset_to_batch(&ds).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
        assert!(batch.column(2).is_null(1));
    }

    #[test]
    fn test_field_type_mapping() {
        assert_eq!(field_type(&DataType::UInt16), FieldType::Integer);
        assert_eq!(field_type(&DataType::Float32), FieldType::Float);
        assert_eq!(
            field_type(&DataType::Timestamp(TimeUnit::Millisecond, None)),
            FieldType::Date
        );
        assert_eq!(field_type(&DataType::Binary), FieldType::String);
    }
}
