mod config;
mod server;
mod source;

pub use config::Config;
pub use server::{ExportConfig, ServerConfig, SessionConfig};
pub use source::{
    ConnectionConfig, ConnectionsConfig, FileFormat, LocalSourceConfig, S3SourceConfig,
    SourceConfig,
};
