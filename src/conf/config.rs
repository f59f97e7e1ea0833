use crate::{
    conf::{ConnectionsConfig, ExportConfig, ServerConfig, SessionConfig},
    core::JunctionError::{self, ConfigParsingError},
};
use config::Config as CConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub connections: ConnectionsConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    pub fn from_str(toml_str: &str) -> Result<Config, JunctionError> {
        let config = CConfig::builder()
            .add_source(config::File::from_str(toml_str, config::FileFormat::Toml))
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))?;
        Ok(config)
    }

    /// Loads an optional TOML file, then applies `JUNCTION_*` environment
    /// overrides (`JUNCTION_SERVER__PORT=9000`).
    pub fn load(path: Option<&str>) -> Result<Config, JunctionError> {
        let mut builder = CConfig::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix("JUNCTION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::conf::{ConnectionConfig, FileFormat, LocalSourceConfig, SourceConfig};

    #[test]
    fn load_correct_toml() {
        let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 3000

        [session]
        history_capacity = 10

        [connections.files]
        source = { local = { path = "/data/uploads" } }
        format = "csv"
        poll_interval = "30s"

        [export]
        cloud = { s3 = { bucket = "exports", region = "eu-west-1" } }
        "#;
        let conf = Config::from_str(toml).unwrap();
        assert_eq!(
            conf.server,
            ServerConfig {
                host: String::from("127.0.0.1"),
                port: 3000
            }
        );
        assert_eq!(conf.session.history_capacity, 10);
        assert_eq!(conf.session.sample_size, 5);
        assert_eq!(
            conf.connections.get("files"),
            Some(&ConnectionConfig {
                source: SourceConfig::Local(LocalSourceConfig {
                    path: "/data/uploads".to_string()
                }),
                format: FileFormat::Csv,
                poll_interval: Some(Duration::from_secs(30)),
            })
        );
        let Some(SourceConfig::S3(cloud)) = &conf.export.cloud else {
            panic!("expected s3 export target");
        };
        assert_eq!(cloud.bucket, "exports");
        assert_eq!(cloud.prefix, "");
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let conf = Config::from_str("").unwrap();
        assert_eq!(conf, Config::default());
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
        [session]
        history_size = 10
        "#;
        assert!(matches!(
            Config::from_str(toml),
            Err(JunctionError::ConfigParsingError(_))
        ));
    }
}
