mod session;

pub use session::{RunOutcome, Session};

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::catalog::{Catalog, ConnectionListing, RefreshOutcome};
use crate::conf::Config;
use crate::core::{Dataset, JunctionError, SelectionKey};
use crate::export::{Delivery, Destination, ExportFormat, ExportSink, Exporter, ObjectStoreSink};
use crate::history::HistoryEntry;
use crate::join::JoinSpec;
use crate::pipeline::{StepConfig, TransformationStep};
use crate::profile::ProfilingReport;
use crate::selection::{SelectedTable, ToggleResult};
use crate::source::FileAdapter;

/// The catalog plus one composition session, shared by the HTTP handlers.
pub struct JunctionService {
    catalog: Catalog,
    session: Mutex<Session>,
    exporter: Exporter,
    config: Config,
}

impl JunctionService {
    /// Registers a file adapter per configured connection. Connections are
    /// not refreshed here.
    pub async fn new(config: Config) -> Result<Self, JunctionError> {
        let catalog = Catalog::new(config.session.sample_size);
        for (id, connection) in &config.connections {
            let adapter = FileAdapter::new(connection)?;
            catalog.register(id, Arc::new(adapter)).await;
            info!("registered connection '{}'", id);
        }

        let mut exporter = Exporter::new();
        if let Some(cloud) = &config.export.cloud {
            exporter.register(
                Destination::Cloud,
                Arc::new(ObjectStoreSink::from_config(cloud)?),
            );
        }

        Ok(Self {
            catalog,
            session: Mutex::new(Session::new(&config.session)),
            exporter,
            config,
        })
    }

    /// Adds a delivery target for `database`, `cloud` or `api` exports.
    pub fn with_sink(mut self, destination: Destination, sink: Arc<dyn ExportSink>) -> Self {
        self.exporter.register(destination, sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn list_catalog(&self) -> Vec<ConnectionListing> {
        self.catalog.list().await
    }

    pub async fn refresh(&self, connection_id: &str) -> Result<RefreshOutcome, JunctionError> {
        self.catalog.refresh(connection_id).await
    }

    pub async fn refresh_all(&self) -> Vec<(String, Result<RefreshOutcome, JunctionError>)> {
        self.catalog.refresh_all().await
    }

    /// Starts a refresh loop for every connection with a `poll_interval`.
    pub fn spawn_pollers(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for (id, connection) in &self.config.connections {
            let Some(period) = connection.poll_interval else {
                continue;
            };
            let catalog = self.catalog.clone();
            let id = id.clone();
            info!("polling connection '{}' every {:?}", id, period);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // the first tick fires immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = catalog.refresh(&id).await {
                        warn!("polling connection '{}' failed: {}", id, e);
                    }
                }
            }));
        }
        handles
    }

    pub async fn selection(&self) -> Vec<SelectedTable> {
        self.session.lock().await.selection().list().to_vec()
    }

    /// Selects a catalogued table, or deselects it if already selected.
    pub async fn toggle(&self, key: SelectionKey) -> Result<ToggleResult, JunctionError> {
        let mut session = self.session.lock().await;
        let metadata = match session.selection().get(&key) {
            Some(selected) => selected.metadata.clone(),
            None => self.catalog.get_metadata(&key).await?,
        };
        Ok(session.toggle(key, metadata))
    }

    /// Fetches one page of a selected table and makes it the table's rows in scope.
    pub async fn load_page(
        &self,
        key: SelectionKey,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<SelectedTable, JunctionError> {
        let limit = limit.unwrap_or(self.config.session.page_size);
        let selected = self
            .session
            .lock()
            .await
            .selection()
            .require(&key)?
            .clone();

        let rows = self.catalog.fetch_page(&key, offset, limit).await?;
        let paged = selected.with_page(offset, limit, rows);
        self.session.lock().await.load_page(paged.clone())?;
        Ok(paged)
    }

    pub async fn join(&self, spec: &JoinSpec) -> Result<Dataset, JunctionError> {
        self.session.lock().await.join(spec)
    }

    pub async fn steps(&self) -> Vec<TransformationStep> {
        self.session.lock().await.pipeline().steps().to_vec()
    }

    pub async fn add_step(&self, config: StepConfig) -> Result<TransformationStep, JunctionError> {
        self.session.lock().await.add_step(config)
    }

    pub async fn remove_step(&self, step_id: u64) -> Result<TransformationStep, JunctionError> {
        self.session.lock().await.remove_step(step_id)
    }

    pub async fn clear_pipeline(&self) {
        self.session.lock().await.clear_pipeline();
    }

    pub async fn run_pipeline(&self) -> Result<RunOutcome, JunctionError> {
        self.session.lock().await.run_pipeline()
    }

    pub async fn dataset(&self) -> Option<Dataset> {
        self.session.lock().await.dataset().cloned()
    }

    pub async fn profile(&self) -> Result<Vec<ProfilingReport>, JunctionError> {
        self.session.lock().await.profile()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.session.lock().await.history().cloned().collect()
    }

    pub async fn clear_history(&self) {
        self.session.lock().await.clear_history();
    }

    /// Serializes the current dataset and delivers it. History records the
    /// export only once delivery succeeded.
    pub async fn export(
        &self,
        format: ExportFormat,
        destination: Destination,
        file_name: Option<&str>,
    ) -> Result<Delivery, JunctionError> {
        let dataset = self.session.lock().await.export_source()?;
        let export = self.exporter.export(&dataset, format, file_name)?;
        let details = format!(
            "{} ({} rows) as {} to {}",
            export.file_name,
            dataset.row_count(),
            format,
            destination
        );

        let delivery = self.exporter.deliver(export, destination).await?;
        self.session.lock().await.record_export(details);
        Ok(delivery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::{ConnectionConfig, FileFormat, LocalSourceConfig, SourceConfig};
    use crate::history;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_registers_file_connections() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("crm")).unwrap();
        std::fs::write(dir.path().join("crm/users.csv"), "id,name\n1,Ann\n2,Bob\n").unwrap();

        let config = Config {
            connections: HashMap::from([(
                "files".to_string(),
                ConnectionConfig {
                    source: SourceConfig::Local(LocalSourceConfig {
                        path: dir.path().to_string_lossy().to_string(),
                    }),
                    format: FileFormat::Csv,
                    poll_interval: None,
                },
            )]),
            ..Config::default()
        };
        let service = JunctionService::new(config).await.unwrap();
        assert_eq!(service.catalog().connection_ids().await, vec!["files"]);
        assert!(service.spawn_pollers().is_empty());

        service.refresh_all().await;
        let key = SelectionKey::new("files", "crm", "users");
        assert_eq!(service.toggle(key.clone()).await.unwrap(), ToggleResult::Selected);

        let paged = service.load_page(key, 1, Some(10)).await.unwrap();
        assert_eq!(paged.rows.len(), 1);

        let delivery = service
            .export(ExportFormat::Csv, Destination::Download, None)
            .await
            .unwrap();
        let Delivery::Download(export) = delivery else {
            panic!("expected a download");
        };
        assert_eq!(export.file_name, "users.csv");
        assert_eq!(&export.payload[..], b"id,name\n2,Bob\n");
        assert_eq!(
            service.history().await[0].operation,
            history::DATASET_EXPORTED
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_recorded() {
        let service = JunctionService::new(Config::default()).await.unwrap();
        let err = service
            .export(ExportFormat::Csv, Destination::Download, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JunctionError::SelectionError(_)));
        assert!(service.history().await.is_empty());
    }
}
