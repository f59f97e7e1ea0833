use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{FieldDescriptor, JunctionError, Row, infer_fields};

use super::SourceAdapter;

/// Rows held by a [`MemoryAdapter`]. Without declared fields the schema is
/// inferred from the rows, the way document stores report their collections.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub fields: Option<Vec<FieldDescriptor>>,
    pub rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(fields: Vec<FieldDescriptor>, rows: Vec<Row>) -> Self {
        Self {
            fields: Some(fields),
            rows,
        }
    }

    pub fn schemaless(rows: Vec<Row>) -> Self {
        Self { fields: None, rows }
    }
}

/// Source adapter over rows pushed in by the host. Used for sources whose
/// drivers run outside the engine and for tests.
#[derive(Default)]
pub struct MemoryAdapter {
    databases: RwLock<BTreeMap<String, BTreeMap<String, MemoryTable>>>,
    failure: RwLock<Option<String>>,
    latency: Option<Duration>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, to exercise overlapping refreshes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert_table(&self, database: &str, table: &str, data: MemoryTable) {
        let mut databases = self.databases.write().await;
        databases
            .entry(database.to_string())
            .or_default()
            .insert(table.to_string(), data);
    }

    pub async fn remove_table(&self, database: &str, table: &str) {
        let mut databases = self.databases.write().await;
        if let Some(tables) = databases.get_mut(database) {
            tables.remove(table);
        }
    }

    /// Makes every subsequent call fail with `message`, or recover with `None`.
    pub async fn set_failure(&self, message: Option<String>) {
        *self.failure.write().await = message;
    }

    async fn check(&self, connection_id: &str) -> Result<(), JunctionError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failure.read().await.as_ref() {
            Some(message) => Err(JunctionError::catalog(connection_id, message.clone())),
            None => Ok(()),
        }
    }

    async fn with_table<T>(
        &self,
        database: &str,
        table: &str,
        f: impl FnOnce(&MemoryTable) -> T,
    ) -> Result<T, JunctionError> {
        let databases = self.databases.read().await;
        databases
            .get(database)
            .and_then(|tables| tables.get(table))
            .map(f)
            .ok_or_else(|| JunctionError::TableNotFound(format!("{}.{}", database, table)))
    }
}

#[async_trait]
impl SourceAdapter for MemoryAdapter {
    async fn list_databases(&self, connection_id: &str) -> Result<Vec<String>, JunctionError> {
        self.check(connection_id).await?;
        Ok(self.databases.read().await.keys().cloned().collect())
    }

    async fn list_tables(
        &self,
        connection_id: &str,
        database: &str,
    ) -> Result<Vec<String>, JunctionError> {
        self.check(connection_id).await?;
        let databases = self.databases.read().await;
        databases
            .get(database)
            .map(|tables| tables.keys().cloned().collect())
            .ok_or_else(|| JunctionError::TableNotFound(database.to_string()))
    }

    async fn get_schema(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldDescriptor>, JunctionError> {
        self.check(connection_id).await?;
        self.with_table(database, table, |t| {
            t.fields.clone().unwrap_or_else(|| infer_fields(&t.rows))
        })
        .await
    }

    async fn count_rows(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<u64, JunctionError> {
        self.check(connection_id).await?;
        self.with_table(database, table, |t| t.rows.len() as u64)
            .await
    }

    async fn fetch_page(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, JunctionError> {
        self.check(connection_id).await?;
        self.with_table(database, table, |t| {
            t.rows.iter().skip(offset).take(limit).cloned().collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldType, Value};

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::from_iter([("id".to_string(), Value::Number(i as f64))]))
            .collect()
    }

    #[tokio::test]
    async fn test_lists_databases_and_tables() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_table("analytics", "events", MemoryTable::schemaless(rows(3)))
            .await;
        adapter
            .insert_table("analytics", "sessions", MemoryTable::schemaless(rows(1)))
            .await;

        assert_eq!(adapter.list_databases("mongo").await.unwrap(), vec!["analytics"]);
        assert_eq!(
            adapter.list_tables("mongo", "analytics").await.unwrap(),
            vec!["events", "sessions"]
        );
        let schema = adapter.get_schema("mongo", "analytics", "events").await.unwrap();
        assert_eq!(schema, vec![FieldDescriptor::new("id", FieldType::Integer, false)]);
    }

    #[tokio::test]
    async fn test_fetch_page_and_sample() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_table("db", "t", MemoryTable::schemaless(rows(10)))
            .await;

        let page = adapter.fetch_page("c", "db", "t", 8, 5).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["id"], Value::Number(8.0));

        let sample = adapter.fetch_sample("c", "db", "t", 5).await.unwrap();
        assert_eq!(sample.len(), 5);
        assert_eq!(adapter.count_rows("c", "db", "t").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let adapter = MemoryAdapter::new();
        adapter.set_failure(Some("connection refused".into())).await;
        let err = adapter.list_databases("pg").await.unwrap_err();
        assert_eq!(err, JunctionError::catalog("pg", "connection refused"));

        adapter.set_failure(None).await;
        assert!(adapter.list_databases("pg").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_table() {
        let adapter = MemoryAdapter::new();
        let err = adapter.get_schema("c", "db", "nope").await.unwrap_err();
        assert!(matches!(err, JunctionError::TableNotFound(_)));
    }
}
