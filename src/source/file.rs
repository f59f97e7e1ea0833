use std::io::Cursor;
use std::sync::Arc;

use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::conf::{ConnectionConfig, FileFormat, LocalSourceConfig, S3SourceConfig, SourceConfig};
use crate::convert::{batch_to_rows, schema_fields};
use crate::core::{FieldDescriptor, JunctionError, Row};

use super::SourceAdapter;

const CSV_INFER_RECORDS: usize = 1000;

/// Creates a LocalFileSystem ObjectStore rooted at the configured path.
pub fn create_local_store(config: &LocalSourceConfig) -> Result<Arc<dyn ObjectStore>, JunctionError> {
    let store = LocalFileSystem::new_with_prefix(&config.path).map_err(|e| {
        JunctionError::ConfigParsingError(format!(
            "cannot open local source '{}': {}",
            config.path, e
        ))
    })?;
    Ok(Arc::new(store))
}

/// Creates an S3 ObjectStore from S3SourceConfig.
pub fn create_s3_store(config: &S3SourceConfig) -> Result<Arc<dyn ObjectStore>, JunctionError> {
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region);

    // MinIO, LocalStack and friends
    if let Some(endpoint) = &config.endpoint {
        builder = builder.with_endpoint(endpoint);
        if endpoint.starts_with("http://") {
            builder = builder.with_allow_http(true);
        }
    }

    let store = builder.build().map_err(|e| {
        JunctionError::ConfigParsingError(format!(
            "failed to create S3 store for bucket '{}': {}",
            config.bucket, e
        ))
    })?;

    Ok(Arc::new(store))
}

/// Flat-file source: every top-level directory under the root is a database
/// and every `.parquet` / `.csv` file in it is a table.
pub struct FileAdapter {
    store: Arc<dyn ObjectStore>,
    prefix: Option<ObjectPath>,
    format: FileFormat,
}

impl FileAdapter {
    pub fn new(config: &ConnectionConfig) -> Result<Self, JunctionError> {
        match &config.source {
            SourceConfig::Local(local) => Ok(Self::with_store(
                create_local_store(local)?,
                "",
                config.format,
            )),
            SourceConfig::S3(s3) => Ok(Self::with_store(
                create_s3_store(s3)?,
                &s3.prefix,
                config.format,
            )),
        }
    }

    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: &str, format: FileFormat) -> Self {
        let prefix = prefix.trim_matches('/');
        Self {
            store,
            prefix: (!prefix.is_empty()).then(|| ObjectPath::from(prefix)),
            format,
        }
    }

    fn database_path(&self, database: &str) -> ObjectPath {
        match &self.prefix {
            Some(prefix) => prefix.child(database),
            None => ObjectPath::from(database),
        }
    }

    fn table_path(&self, database: &str, table: &str) -> ObjectPath {
        self.database_path(database)
            .child(format!("{}.{}", table, self.format.extension()))
    }

    async fn read_bytes(&self, database: &str, table: &str) -> Result<Bytes, JunctionError> {
        let path = self.table_path(database, table);
        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                JunctionError::TableNotFound(format!("{}.{}", database, table))
            }
            other => other.into(),
        })?;
        Ok(result.bytes().await?)
    }

    async fn read_batches(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<RecordBatch>, JunctionError> {
        let bytes = self.read_bytes(database, table).await?;
        match self.format {
            FileFormat::Parquet => {
                let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
                Ok(reader.collect::<Result<Vec<_>, _>>()?)
            }
            FileFormat::Csv => {
                let format = csv_format();
                let schema = infer_csv_schema(&bytes)?;
                let reader = ReaderBuilder::new(Arc::new(schema))
                    .with_format(format)
                    .build(Cursor::new(bytes))?;
                Ok(reader.collect::<Result<Vec<_>, _>>()?)
            }
        }
    }

    /// File schema without decoding rows, so empty files still report columns.
    async fn read_schema(&self, database: &str, table: &str) -> Result<Schema, JunctionError> {
        let bytes = self.read_bytes(database, table).await?;
        match self.format {
            FileFormat::Parquet => {
                let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
                Ok(builder.schema().as_ref().clone())
            }
            FileFormat::Csv => infer_csv_schema(&bytes),
        }
    }
}

fn csv_format() -> Format {
    Format::default().with_header(true)
}

fn infer_csv_schema(bytes: &Bytes) -> Result<Schema, JunctionError> {
    let (schema, _) =
        csv_format().infer_schema(Cursor::new(bytes.clone()), Some(CSV_INFER_RECORDS))?;
    Ok(schema)
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    async fn list_databases(&self, _connection_id: &str) -> Result<Vec<String>, JunctionError> {
        let listing = self.store.list_with_delimiter(self.prefix.as_ref()).await?;
        let mut databases: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect();
        databases.sort();
        Ok(databases)
    }

    async fn list_tables(
        &self,
        _connection_id: &str,
        database: &str,
    ) -> Result<Vec<String>, JunctionError> {
        let listing = self
            .store
            .list_with_delimiter(Some(&self.database_path(database)))
            .await?;
        let extension = self.format.extension();
        let suffix = format!(".{}", extension);
        let mut tables: Vec<String> = listing
            .objects
            .iter()
            .filter(|meta| meta.location.extension() == Some(extension))
            .filter_map(|meta| {
                meta.location
                    .filename()
                    .and_then(|name| name.strip_suffix(&suffix))
                    .map(str::to_string)
            })
            .collect();
        tables.sort();
        Ok(tables)
    }

    async fn get_schema(
        &self,
        _connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<Vec<FieldDescriptor>, JunctionError> {
        let schema = self.read_schema(database, table).await?;
        Ok(schema_fields(&schema))
    }

    async fn count_rows(
        &self,
        _connection_id: &str,
        database: &str,
        table: &str,
    ) -> Result<u64, JunctionError> {
        if self.format == FileFormat::Parquet {
            let bytes = self.read_bytes(database, table).await?;
            let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
            return Ok(builder.metadata().file_metadata().num_rows().max(0) as u64);
        }
        let batches = self.read_batches(database, table).await?;
        Ok(batches.iter().map(|b| b.num_rows() as u64).sum())
    }

    async fn fetch_page(
        &self,
        _connection_id: &str,
        database: &str,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, JunctionError> {
        let batches = self.read_batches(database, table).await?;
        let end = offset.saturating_add(limit);
        let mut rows = Vec::new();
        let mut start = 0usize;

        for batch in &batches {
            let batch_end = start + batch.num_rows();
            if batch_end > offset && start < end {
                let from = offset.saturating_sub(start);
                let to = end.min(batch_end) - start;
                rows.extend(batch_to_rows(&batch.slice(from, to - from))?);
            }
            if batch_end >= end {
                break;
            }
            start = batch_end;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldType, Value};
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use parquet::arrow::ArrowWriter;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn write_parquet(path: &std::path::Path, n: usize) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("region", DataType::Utf8, false),
            Field::new("sales", DataType::Float64, true),
        ]));
        let regions: StringArray = (0..n).map(|i| Some(format!("r{}", i))).collect();
        let sales: Float64Array = (0..n).map(|i| Some(i as f64 * 10.0)).collect();
        let batch =
            RecordBatch::try_new(schema.clone(), vec![Arc::new(regions), Arc::new(sales)]).unwrap();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn adapter(dir: &TempDir, format: FileFormat) -> FileAdapter {
        let store = create_local_store(&LocalSourceConfig {
            path: dir.path().to_string_lossy().to_string(),
        })
        .unwrap();
        FileAdapter::with_store(store, "", format)
    }

    #[tokio::test]
    async fn test_parquet_catalog_and_rows() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        write_parquet(&dir.path().join("uploads/sales_data.parquet"), 12);
        fs::write(dir.path().join("uploads/README.txt"), "ignored").unwrap();

        let adapter = adapter(&dir, FileFormat::Parquet);
        assert_eq!(adapter.list_databases("files").await.unwrap(), vec!["uploads"]);
        assert_eq!(
            adapter.list_tables("files", "uploads").await.unwrap(),
            vec!["sales_data"]
        );

        let schema = adapter.get_schema("files", "uploads", "sales_data").await.unwrap();
        assert_eq!(schema[0], FieldDescriptor::new("region", FieldType::String, false));
        assert_eq!(schema[1], FieldDescriptor::new("sales", FieldType::Float, true));

        assert_eq!(
            adapter.count_rows("files", "uploads", "sales_data").await.unwrap(),
            12
        );

        let page = adapter
            .fetch_page("files", "uploads", "sales_data", 10, 5)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0]["region"], Value::from("r10"));
        assert_eq!(page[1]["sales"], Value::Number(110.0));
    }

    #[tokio::test]
    async fn test_csv_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        fs::write(
            dir.path().join("uploads/people.csv"),
            "name,age\nann,31\nbob,\ncid,27\n",
        )
        .unwrap();

        let adapter = adapter(&dir, FileFormat::Csv);
        assert_eq!(adapter.list_tables("files", "uploads").await.unwrap(), vec!["people"]);

        let schema = adapter.get_schema("files", "uploads", "people").await.unwrap();
        assert_eq!(schema[1].inferred_type, FieldType::Integer);

        let rows = adapter.fetch_sample("files", "uploads", "people", 5).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["age"], Value::Number(31.0));
        assert_eq!(rows[1]["age"], Value::Null);
        assert_eq!(adapter.count_rows("files", "uploads", "people").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_header_only_csv_keeps_columns() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        fs::write(dir.path().join("uploads/empty.csv"), "id,name,joined_at\n").unwrap();

        let adapter = adapter(&dir, FileFormat::Csv);
        let schema = adapter.get_schema("files", "uploads", "empty").await.unwrap();
        let names: Vec<&str> = schema.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "joined_at"]);
        assert_eq!(adapter.count_rows("files", "uploads", "empty").await.unwrap(), 0);
        assert!(adapter.fetch_sample("files", "uploads", "empty", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_parquet_keeps_columns() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        write_parquet(&dir.path().join("uploads/none.parquet"), 0);

        let adapter = adapter(&dir, FileFormat::Parquet);
        let schema = adapter.get_schema("files", "uploads", "none").await.unwrap();
        assert_eq!(schema[0], FieldDescriptor::new("region", FieldType::String, false));
        assert_eq!(schema[1], FieldDescriptor::new("sales", FieldType::Float, true));
        assert_eq!(adapter.count_rows("files", "uploads", "none").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, FileFormat::Parquet);
        let err = adapter
            .fetch_page("files", "uploads", "nope", 0, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, JunctionError::TableNotFound(_)));
    }
}
