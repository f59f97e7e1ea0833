use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum JunctionError {
    #[error("Cannot parse config: {0}")]
    ConfigParsingError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Arrow error: {0}")]
    ArrowError(String),
    #[error("Catalog error on connection '{connection}': {message}")]
    CatalogError { connection: String, message: String },
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Invalid join: {0}")]
    JoinConfigError(String),
    #[error("Selection error: {0}")]
    SelectionError(String),
    #[error("Step {step} references {message}")]
    StepReferenceError { step: u64, message: String },
    #[error("Step {step} failed: {message}")]
    StepExecutionError { step: u64, message: String },
    #[error("Step not found: {0}")]
    StepNotFound(u64),
    #[error("Export error: {0}")]
    ExportError(String),
}

impl JunctionError {
    pub fn catalog(connection: &str, message: impl Into<String>) -> Self {
        JunctionError::CatalogError {
            connection: connection.to_string(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for JunctionError {
    fn from(err: std::io::Error) -> Self {
        JunctionError::IoError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for JunctionError {
    fn from(err: arrow::error::ArrowError) -> Self {
        JunctionError::ArrowError(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for JunctionError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        JunctionError::ArrowError(err.to_string())
    }
}

impl From<object_store::Error> for JunctionError {
    fn from(err: object_store::Error) -> Self {
        JunctionError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for JunctionError {
    fn from(err: serde_json::Error) -> Self {
        JunctionError::IoError(err.to_string())
    }
}
