mod state;

pub use state::{
    ConnectionListing, ConnectionStatus, DatabaseListing, RefreshOutcome, TableSummary,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use log::{info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

use crate::core::{JunctionError, Row, SelectionKey, TableMetadata};
use crate::source::SourceAdapter;

use state::{ConnectionEntry, ConnectionState, DatabaseTree};

struct CatalogInner {
    entries: RwLock<HashMap<String, ConnectionEntry>>,
    connections: RwLock<HashMap<String, ConnectionState>>,
    sample_size: usize,
}

/// Registry of connections, their databases and table metadata.
///
/// Each connection's subtree is replaced as a whole on refresh. Refreshes of
/// different connections run independently; refreshes of one connection are
/// serialized and only the most recently requested one may publish.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<CatalogInner>,
}

impl Catalog {
    pub fn new(sample_size: usize) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                entries: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashMap::new()),
                sample_size,
            }),
        }
    }

    /// Attaches an adapter. Re-registering replaces the adapter and supersedes
    /// any refresh still running against the old one.
    pub async fn register(&self, connection_id: &str, adapter: Arc<dyn SourceAdapter>) {
        let mut entries = self.inner.entries.write().await;
        let entry = match entries.remove(connection_id) {
            Some(old) => {
                old.generation.fetch_add(1, Ordering::SeqCst);
                ConnectionEntry {
                    adapter,
                    refresh_lock: old.refresh_lock,
                    generation: old.generation,
                }
            }
            None => ConnectionEntry {
                adapter,
                refresh_lock: Arc::new(Mutex::new(())),
                generation: Arc::new(AtomicU64::new(0)),
            },
        };
        entries.insert(connection_id.to_string(), entry);
        self.inner
            .connections
            .write()
            .await
            .entry(connection_id.to_string())
            .or_insert_with(ConnectionState::pending);
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn refresh(&self, connection_id: &str) -> Result<RefreshOutcome, JunctionError> {
        let (adapter, lock, generation) = {
            let entries = self.inner.entries.read().await;
            let entry = entries.get(connection_id).ok_or_else(|| {
                JunctionError::catalog(connection_id, "connection is not registered")
            })?;
            (
                entry.adapter.clone(),
                entry.refresh_lock.clone(),
                entry.generation.clone(),
            )
        };

        let ticket = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = lock.lock().await;
        if generation.load(Ordering::SeqCst) != ticket {
            return Ok(RefreshOutcome::Superseded);
        }

        let result = load_tree(adapter.as_ref(), connection_id, self.inner.sample_size).await;

        if generation.load(Ordering::SeqCst) != ticket {
            info!("discarding superseded refresh of connection '{}'", connection_id);
            return Ok(RefreshOutcome::Superseded);
        }

        let mut connections = self.inner.connections.write().await;
        let state = connections
            .entry(connection_id.to_string())
            .or_insert_with(ConnectionState::pending);

        match result {
            Ok(databases) => {
                let tables = databases.values().map(|t| t.len()).sum();
                let outcome = RefreshOutcome::Updated {
                    databases: databases.len(),
                    tables,
                };
                state.databases = databases;
                state.status = ConnectionStatus::Reachable {
                    refreshed_at: Utc::now(),
                };
                info!(
                    "refreshed connection '{}': {} databases, {} tables",
                    connection_id,
                    state.databases.len(),
                    tables
                );
                Ok(outcome)
            }
            Err(err) => {
                warn!("connection '{}' is unreachable: {}", connection_id, err);
                state.status = ConnectionStatus::Unreachable {
                    error: err.to_string(),
                    since: Utc::now(),
                };
                Ok(RefreshOutcome::Unreachable(err.to_string()))
            }
        }
    }

    /// Refreshes every registered connection concurrently. A failing
    /// connection never affects the others.
    pub async fn refresh_all(&self) -> Vec<(String, Result<RefreshOutcome, JunctionError>)> {
        let mut tasks = JoinSet::new();
        for id in self.connection_ids().await {
            let catalog = self.clone();
            tasks.spawn(async move {
                let outcome = catalog.refresh(&id).await;
                (id, outcome)
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("catalog refresh task failed: {}", e),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        outcomes
    }

    pub async fn status(&self, connection_id: &str) -> Option<ConnectionStatus> {
        let connections = self.inner.connections.read().await;
        connections.get(connection_id).map(|s| s.status.clone())
    }

    pub async fn get_metadata(&self, key: &SelectionKey) -> Result<TableMetadata, JunctionError> {
        let connections = self.inner.connections.read().await;
        let state = connections
            .get(&key.connection_id)
            .ok_or_else(|| JunctionError::TableNotFound(key.to_string()))?;
        if let ConnectionStatus::Unreachable { error, .. } = &state.status {
            return Err(JunctionError::catalog(&key.connection_id, error.clone()));
        }
        state
            .databases
            .get(&key.database)
            .and_then(|tables| tables.get(&key.table_name))
            .cloned()
            .ok_or_else(|| JunctionError::TableNotFound(key.to_string()))
    }

    /// Reachable connections only, ordered by id.
    pub async fn list(&self) -> Vec<ConnectionListing> {
        let connections = self.inner.connections.read().await;
        let mut listings: Vec<ConnectionListing> = connections
            .iter()
            .filter(|(_, state)| state.status.is_reachable())
            .map(|(id, state)| ConnectionListing {
                connection_id: id.clone(),
                status: state.status.clone(),
                databases: state
                    .databases
                    .iter()
                    .map(|(name, tables)| DatabaseListing {
                        name: name.clone(),
                        tables: tables
                            .values()
                            .map(|t| TableSummary {
                                name: t.table_name.clone(),
                                row_count: t.row_count,
                                fields: t.fields.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        listings.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        listings
    }

    pub async fn fetch_page(
        &self,
        key: &SelectionKey,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>, JunctionError> {
        let adapter = {
            let entries = self.inner.entries.read().await;
            entries
                .get(&key.connection_id)
                .map(|e| e.adapter.clone())
                .ok_or_else(|| {
                    JunctionError::catalog(&key.connection_id, "connection is not registered")
                })?
        };
        adapter
            .fetch_page(
                &key.connection_id,
                &key.database,
                &key.table_name,
                offset,
                limit,
            )
            .await
    }
}

async fn load_tree(
    adapter: &dyn SourceAdapter,
    connection_id: &str,
    sample_size: usize,
) -> Result<DatabaseTree, JunctionError> {
    let mut tree = DatabaseTree::new();
    for database in adapter.list_databases(connection_id).await? {
        let mut tables = std::collections::BTreeMap::new();
        for table in adapter.list_tables(connection_id, &database).await? {
            let fields = adapter.get_schema(connection_id, &database, &table).await?;
            let row_count = adapter.count_rows(connection_id, &database, &table).await?;
            let sample_rows = adapter
                .fetch_sample(connection_id, &database, &table, sample_size)
                .await?;
            log::debug!(
                "catalogued {}.{}.{} ({} fields, {} rows)",
                connection_id,
                database,
                table,
                fields.len(),
                row_count
            );
            tables.insert(
                table.clone(),
                TableMetadata {
                    connection_id: connection_id.to_string(),
                    database: database.clone(),
                    table_name: table,
                    fields,
                    row_count,
                    sample_rows,
                },
            );
        }
        tree.insert(database, tables);
    }
    Ok(tree)
}
