use std::fmt;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use super::value::Value;

/// A row as read from any source: column name to cell. Missing keys read as null.
pub type Row = AHashMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Object,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// Widens two observed types into one that describes both.
    pub fn unify(self, other: FieldType) -> FieldType {
        match (self, other) {
            (a, b) if a == b => a,
            (FieldType::Integer, FieldType::Float) | (FieldType::Float, FieldType::Integer) => {
                FieldType::Float
            }
            _ => FieldType::String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    pub name: String,
    pub inferred_type: FieldType,
    #[serde(default = "FieldDescriptor::default_nullable")]
    pub nullable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, inferred_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            nullable,
        }
    }

    pub fn default_nullable() -> bool {
        true
    }
}

/// Identity of a table across all connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionKey {
    pub connection_id: String,
    pub database: String,
    pub table_name: String,
}

impl SelectionKey {
    pub fn new(
        connection_id: impl Into<String>,
        database: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            database: database.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for SelectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.connection_id, self.database, self.table_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableMetadata {
    pub connection_id: String,
    pub database: String,
    pub table_name: String,
    pub fields: Vec<FieldDescriptor>,
    pub row_count: u64,
    pub sample_rows: Vec<Row>,
}

impl TableMetadata {
    pub fn key(&self) -> SelectionKey {
        SelectionKey::new(&self.connection_id, &self.database, &self.table_name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Infers field descriptors from rows when a source has no declared schema,
/// in first-seen column order.
pub fn infer_fields(rows: &[Row]) -> Vec<FieldDescriptor> {
    let mut order: Vec<String> = Vec::new();
    let mut types: AHashMap<String, (Option<FieldType>, bool)> = AHashMap::new();

    for row in rows {
        let mut names: Vec<&String> = row.keys().collect();
        names.sort();
        for name in names {
            if !types.contains_key(name) {
                order.push(name.clone());
                types.insert(name.clone(), (None, false));
            }
        }
    }

    for row in rows {
        for name in &order {
            let Some(entry) = types.get_mut(name) else {
                continue;
            };
            match row.get(name).and_then(Value::infer_type) {
                Some(t) => entry.0 = Some(entry.0.map_or(t, |prev| prev.unify(t))),
                None => entry.1 = true,
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let (t, nullable) = types.get(&name).copied().unwrap_or((None, true));
            FieldDescriptor::new(name, t.unwrap_or(FieldType::String), nullable)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_key_display() {
        let key = SelectionKey::new("pg", "production", "orders");
        assert_eq!(key.to_string(), "pg.production.orders");
    }

    #[test]
    fn test_unify_widens() {
        assert_eq!(FieldType::Integer.unify(FieldType::Float), FieldType::Float);
        assert_eq!(FieldType::Integer.unify(FieldType::Date), FieldType::String);
        assert_eq!(FieldType::Date.unify(FieldType::Date), FieldType::Date);
    }

    #[test]
    fn test_infer_fields() {
        let rows = vec![
            row(&[("id", Value::Number(1.0)), ("score", Value::Number(1.5))]),
            row(&[("id", Value::Number(2.0)), ("score", Value::Null)]),
            row(&[("id", Value::Number(3.0)), ("when", Value::from("2024-01-01"))]),
        ];
        let fields = infer_fields(&rows);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], FieldDescriptor::new("id", FieldType::Integer, false));
        assert_eq!(fields[1], FieldDescriptor::new("score", FieldType::Float, true));
        assert_eq!(fields[2], FieldDescriptor::new("when", FieldType::Date, true));
    }
}
