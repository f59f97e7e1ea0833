use serde::{Deserialize, Serialize};

use super::SourceConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8080
    }

    fn default_host() -> String {
        String::from("localhost")
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "SessionConfig::default_sample_size")]
    pub sample_size: usize,
    #[serde(default = "SessionConfig::default_page_size")]
    pub page_size: usize,
}

impl SessionConfig {
    fn default_history_capacity() -> usize {
        50
    }

    fn default_sample_size() -> usize {
        5
    }

    fn default_page_size() -> usize {
        100
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: Self::default_history_capacity(),
            sample_size: Self::default_sample_size(),
            page_size: Self::default_page_size(),
        }
    }
}

/// Where `cloud` exports are written. Without it, cloud exports fail.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default)]
    pub cloud: Option<SourceConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_default() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "localhost");
        assert_eq!(server.port, 8080);
        assert_eq!(server.addr(), "localhost:8080");
    }

    #[test]
    fn test_session_default() {
        let session = SessionConfig::default();
        assert_eq!(session.history_capacity, 50);
        assert_eq!(session.sample_size, 5);
        assert_eq!(session.page_size, 100);
    }
}
