use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::core::{FieldDescriptor, TableMetadata};
use crate::source::SourceAdapter;

pub(crate) type DatabaseTree = BTreeMap<String, BTreeMap<String, TableMetadata>>;

/// A registered adapter plus the bookkeeping that keeps its refreshes ordered.
pub(crate) struct ConnectionEntry {
    pub adapter: Arc<dyn SourceAdapter>,
    /// Held for the whole duration of a refresh.
    pub refresh_lock: Arc<Mutex<()>>,
    /// Bumped by every refresh request; only the latest may publish.
    pub generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Reachable { refreshed_at: DateTime<Utc> },
    Unreachable { error: String, since: DateTime<Utc> },
}

impl ConnectionStatus {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ConnectionStatus::Reachable { .. })
    }
}

pub(crate) struct ConnectionState {
    pub status: ConnectionStatus,
    pub databases: DatabaseTree,
}

impl ConnectionState {
    pub fn pending() -> Self {
        Self {
            status: ConnectionStatus::Pending,
            databases: DatabaseTree::new(),
        }
    }
}

/// Outcome of a single connection refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Updated { databases: usize, tables: usize },
    /// A newer refresh of the same connection was requested; this result was dropped.
    Superseded,
    /// The adapter failed; the connection is hidden from listings.
    Unreachable(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub row_count: u64,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatabaseListing {
    pub name: String,
    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionListing {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub databases: Vec<DatabaseListing>,
}
