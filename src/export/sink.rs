use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};

use crate::conf::SourceConfig;
use crate::core::JunctionError;
use crate::source::{create_local_store, create_s3_store};

/// Where exported bytes go for a non-download destination. Returns a
/// description of where the payload landed.
#[async_trait]
pub trait ExportSink: Send + Sync {
    async fn deliver(&self, name: &str, payload: Bytes) -> Result<String, JunctionError>;
}

/// Writes exports as objects under a prefix of an object store.
pub struct ObjectStoreSink {
    store: Arc<dyn ObjectStore>,
    prefix: Option<ObjectPath>,
}

impl ObjectStoreSink {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        Self {
            store,
            prefix: (!prefix.is_empty()).then(|| ObjectPath::from(prefix)),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, JunctionError> {
        match config {
            SourceConfig::Local(local) => Ok(Self::new(create_local_store(local)?, "")),
            SourceConfig::S3(s3) => Ok(Self::new(create_s3_store(s3)?, &s3.prefix)),
        }
    }
}

#[async_trait]
impl ExportSink for ObjectStoreSink {
    async fn deliver(&self, name: &str, payload: Bytes) -> Result<String, JunctionError> {
        let path = match &self.prefix {
            Some(prefix) => prefix.child(name),
            None => ObjectPath::from(name),
        };
        self.store.put(&path, PutPayload::from(payload)).await?;
        Ok(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::LocalSourceConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_object_under_prefix() {
        let dir = TempDir::new().unwrap();
        let store = create_local_store(&LocalSourceConfig {
            path: dir.path().to_string_lossy().to_string(),
        })
        .unwrap();
        let sink = ObjectStoreSink::new(store, "/exports/");

        let location = sink
            .deliver("orders.csv", Bytes::from_static(b"id\n1\n"))
            .await
            .unwrap();
        assert_eq!(location, "exports/orders.csv");
        let written = std::fs::read(dir.path().join("exports/orders.csv")).unwrap();
        assert_eq!(written, b"id\n1\n");
    }
}
