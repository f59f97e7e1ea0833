mod sink;
mod sql;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::json::writer::JsonArray;
use bytes::Bytes;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use crate::convert::dataset_to_batch;
use crate::core::{Dataset, JunctionError, Provenance};

pub use sink::{ExportSink, ObjectStoreSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Csv,
    Json,
    Excel,
    Parquet,
    SqlDump,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "xlsx",
            ExportFormat::Parquet => "parquet",
            ExportFormat::SqlDump => "sql",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Json => "application/json",
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Parquet => "application/vnd.apache.parquet",
            ExportFormat::SqlDump => "application/sql",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Excel => "excel",
            ExportFormat::Parquet => "parquet",
            ExportFormat::SqlDump => "sql-dump",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Download,
    Database,
    Cloud,
    Api,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Destination::Download => "download",
            Destination::Database => "database",
            Destination::Cloud => "cloud",
            Destination::Api => "api",
        };
        write!(f, "{}", name)
    }
}

/// A serialized dataset ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub format: ExportFormat,
    pub file_name: String,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The caller streams the bytes back to the user.
    Download(Export),
    Delivered {
        destination: Destination,
        location: String,
        bytes: usize,
    },
}

/// Base name for files and SQL tables derived from a dataset.
pub fn dataset_name(dataset: &Dataset) -> String {
    fn name_of(provenance: &Provenance) -> String {
        match provenance {
            Provenance::Table { key } => key.table_name.clone(),
            Provenance::Join { .. } => "joined".to_string(),
            Provenance::Step { parent, .. } => name_of(parent),
        }
    }
    name_of(dataset.provenance())
}

pub fn serialize(dataset: &Dataset, format: ExportFormat) -> Result<Bytes, JunctionError> {
    let payload = match format {
        ExportFormat::Csv => {
            let batch = dataset_to_batch(dataset)?;
            let mut writer = arrow::csv::WriterBuilder::new()
                .with_header(true)
                .build(Vec::new());
            writer.write(&batch)?;
            writer.into_inner()
        }
        ExportFormat::Json => {
            let batch = dataset_to_batch(dataset)?;
            let mut writer = arrow::json::WriterBuilder::new()
                .with_explicit_nulls(true)
                .build::<_, JsonArray>(Vec::new());
            writer.write(&batch)?;
            writer.finish()?;
            writer.into_inner()
        }
        ExportFormat::Parquet => {
            let batch = dataset_to_batch(dataset)?;
            let mut buffer = Vec::new();
            let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;
            buffer
        }
        ExportFormat::SqlDump => sql::dump(dataset, &dataset_name(dataset)).into_bytes(),
        ExportFormat::Excel => {
            return Err(JunctionError::ExportError(
                "excel export is not supported".to_string(),
            ));
        }
    };
    Ok(Bytes::from(payload))
}

/// Serializes datasets and hands them to the sink registered for each destination.
#[derive(Default, Clone)]
pub struct Exporter {
    sinks: HashMap<Destination, Arc<dyn ExportSink>>,
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the sink for `database`, `cloud` or `api` deliveries.
    pub fn register(&mut self, destination: Destination, sink: Arc<dyn ExportSink>) {
        self.sinks.insert(destination, sink);
    }

    pub fn has_sink(&self, destination: Destination) -> bool {
        destination == Destination::Download || self.sinks.contains_key(&destination)
    }

    pub fn export(
        &self,
        dataset: &Dataset,
        format: ExportFormat,
        file_name: Option<&str>,
    ) -> Result<Export, JunctionError> {
        let payload = serialize(dataset, format)?;
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("{}.{}", dataset_name(dataset), format.extension()),
        };
        Ok(Export {
            format,
            file_name,
            payload,
        })
    }

    pub async fn deliver(
        &self,
        export: Export,
        destination: Destination,
    ) -> Result<Delivery, JunctionError> {
        if destination == Destination::Download {
            return Ok(Delivery::Download(export));
        }
        let sink = self.sinks.get(&destination).ok_or_else(|| {
            JunctionError::ExportError(format!("no sink registered for {} exports", destination))
        })?;
        let bytes = export.payload.len();
        let location = sink.deliver(&export.file_name, export.payload).await?;
        info!(
            "delivered {} export '{}' ({} bytes) to {}",
            export.format, export.file_name, bytes, location
        );
        Ok(Delivery::Delivered {
            destination,
            location,
            bytes,
        })
    }
}
