mod file;
mod memory;

pub use file::{FileAdapter, create_local_store, create_s3_store};
pub use memory::{MemoryAdapter, MemoryTable};

use async_trait::async_trait;

use crate::core::{FieldDescriptor, JunctionError, Row};

/// Driver for one source technology. The catalog only ever talks to sources
/// through this trait; relational and document drivers live in the host
/// application and are registered next to the built-in adapters.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn list_databases(&self, connection_id: &str) -> Result<Vec<String>, JunctionError>;

    async fn list_tables(
        &self,
        connection_id: &str,
        database: &str,
    ) -> Result<Vec<String>, JunctionError>;

    async fn get_schema(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldDescriptor>, JunctionError>;

    async fn count_rows(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<u64, JunctionError>;

    async fn fetch_page(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, JunctionError>;

    async fn fetch_sample(
        &self,
        connection_id: &str,
        database: &str,
        table: &str,
        n: usize,
    ) -> Result<Vec<Row>, JunctionError> {
        self.fetch_page(connection_id, database, table, 0, n).await
    }
}
