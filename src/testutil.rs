//! Test and benchmark utilities.
//!
//! This module is only available when the `testutil` feature is enabled.

use std::fs;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::catalog::Catalog;
use crate::conf::{Config, ConnectionConfig, FileFormat, LocalSourceConfig, SourceConfig};
use crate::core::{Dataset, FieldDescriptor, FieldType, Provenance, Row, SelectionKey, Value};
use crate::service::JunctionService;
use crate::source::{MemoryAdapter, MemoryTable};

pub const POSTGRES: &str = "postgres";
pub const MONGO: &str = "mongo";

pub fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// `crm.users` on the relational connection.
pub fn users_table() -> MemoryTable {
    let fields = vec![
        FieldDescriptor::new("id", FieldType::Integer, false),
        FieldDescriptor::new("name", FieldType::String, false),
        FieldDescriptor::new("email", FieldType::String, true),
    ];
    let rows = [
        (1, "John Doe", Some("john@example.com")),
        (2, "Jane Smith", Some("jane@example.com")),
        (3, "Bob Johnson", None),
    ]
    .into_iter()
    .map(|(id, name, email)| {
        row(&[
            ("id", Value::from(id as i64)),
            ("name", Value::from(name)),
            ("email", email.map(Value::from).unwrap_or(Value::Null)),
        ])
    })
    .collect();
    MemoryTable::new(fields, rows)
}

/// `shop.orders` on the document connection, with inferred fields.
pub fn orders_table() -> MemoryTable {
    let rows = [
        (101, 1, 120.50, "shipped", "2024-01-15"),
        (102, 2, 89.99, "pending", "2024-01-16"),
        (103, 1, 200.00, "shipped", "2024-01-17"),
        (104, 4, 75.25, "cancelled", "2024-01-18"),
        (105, 3, 180.75, "shipped", "2024-01-19"),
    ]
    .into_iter()
    .map(|(id, user_id, amount, status, date)| {
        row(&[
            ("id", Value::from(id as i64)),
            ("user_id", Value::from(user_id as i64)),
            ("amount", Value::Number(amount)),
            ("status", Value::from(status)),
            ("order_date", Value::from(date)),
        ])
    })
    .collect();
    MemoryTable::schemaless(rows)
}

pub fn users_key() -> SelectionKey {
    SelectionKey::new(POSTGRES, "crm", "users")
}

pub fn orders_key() -> SelectionKey {
    SelectionKey::new(MONGO, "shop", "orders")
}

/// Two memory-backed connections holding the users and orders fixtures.
pub async fn memory_adapters() -> (Arc<MemoryAdapter>, Arc<MemoryAdapter>) {
    let postgres = Arc::new(MemoryAdapter::new());
    postgres.insert_table("crm", "users", users_table()).await;
    let mongo = Arc::new(MemoryAdapter::new());
    mongo.insert_table("shop", "orders", orders_table()).await;
    (postgres, mongo)
}

/// A refreshed catalog over [`memory_adapters`].
pub async fn sample_catalog(sample_size: usize) -> Catalog {
    let catalog = Catalog::new(sample_size);
    let (postgres, mongo) = memory_adapters().await;
    catalog.register(POSTGRES, postgres).await;
    catalog.register(MONGO, mongo).await;
    catalog.refresh_all().await;
    catalog
}

/// A service whose catalog holds the memory fixtures, already refreshed.
pub async fn sample_service(config: Config) -> JunctionService {
    let service = JunctionService::new(config).await.unwrap();
    let (postgres, mongo) = memory_adapters().await;
    service.catalog().register(POSTGRES, postgres).await;
    service.catalog().register(MONGO, mongo).await;
    service.refresh_all().await;
    service
}

/// A local CSV connection. Each entry is `(database, table, contents)`.
pub fn csv_source(tables: &[(&str, &str, &str)]) -> (TempDir, ConnectionConfig) {
    let dir = TempDir::new().unwrap();
    for (database, table, contents) in tables {
        let db_dir = dir.path().join(database);
        fs::create_dir_all(&db_dir).unwrap();
        fs::write(db_dir.join(format!("{}.csv", table)), contents).unwrap();
    }
    let config = ConnectionConfig {
        source: SourceConfig::Local(LocalSourceConfig {
            path: dir.path().to_string_lossy().to_string(),
        }),
        format: FileFormat::Csv,
        poll_interval: None,
    };
    (dir, config)
}

/// Rows with an integer `key` in `0..key_range` and a float `value`.
pub fn random_rows(seed: u64, num_rows: usize, key_range: i64) -> Vec<Row> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_rows)
        .map(|i| {
            let value = if rng.gen_bool(0.05) {
                Value::Null
            } else {
                Value::Number(rng.gen_range(0.0..1000.0))
            };
            row(&[
                ("id", Value::from(i as i64)),
                ("key", Value::from(rng.gen_range(0..key_range))),
                ("value", value),
            ])
        })
        .collect()
}

pub fn random_dataset(seed: u64, num_rows: usize, key_range: i64) -> Dataset {
    Dataset::new(
        vec!["id".to_string(), "key".to_string(), "value".to_string()],
        random_rows(seed, num_rows, key_range),
        Provenance::Table {
            key: SelectionKey::new("random", "bench", format!("t{}", seed)),
        },
    )
}
