mod args;
mod dataset;
mod error;
mod logger;
mod schema;
mod value;

pub use args::CliArgs;
pub use dataset::{Dataset, Provenance, cell};
pub use error::JunctionError;
pub use logger::setup_logging;
pub use schema::{FieldDescriptor, FieldType, Row, SelectionKey, TableMetadata, infer_fields};
pub use value::{Value, parse_date};
