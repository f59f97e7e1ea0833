use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Parquet,
    Csv,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Parquet => "parquet",
            FileFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct S3SourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "S3SourceConfig::default_region")]
    pub region: String,
}

impl S3SourceConfig {
    pub fn default_region() -> String {
        String::from("us-east-1")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LocalSourceConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub enum SourceConfig {
    #[serde(rename = "s3")]
    S3(S3SourceConfig),
    #[serde(rename = "local")]
    Local(LocalSourceConfig),
}

/// A flat-file connection: databases are top-level directories under the
/// source root, tables are the data files inside them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub format: FileFormat,
    /// Re-read the catalog for this connection on a fixed interval.
    #[serde(with = "humantime_serde", default)]
    pub poll_interval: Option<Duration>,
}

pub type ConnectionsConfig = HashMap<String, ConnectionConfig>;
