use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const TABLE_SELECTED: &str = "Table Selected";
pub const TABLE_DESELECTED: &str = "Table Deselected";
pub const PAGE_LOADED: &str = "Page Loaded";
pub const JOIN_EXECUTED: &str = "Cross-DB Join Executed";
pub const TRANSFORMATION_ADDED: &str = "Transformation Added";
pub const TRANSFORMATION_REMOVED: &str = "Transformation Removed";
pub const PIPELINE_CLEARED: &str = "Pipeline Cleared";
pub const TRANSFORMATIONS_EXECUTED: &str = "Transformations Executed";
pub const DATASET_EXPORTED: &str = "Dataset Exported";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub details: String,
}

/// Bounded audit log. Entries are kept newest first; once `capacity` is
/// reached the oldest entry is dropped for every new one.
#[derive(Debug)]
pub struct HistoryLedger {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    next_id: u64,
}

impl HistoryLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    pub fn append(&mut self, operation: &str, details: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.capacity == 0 {
            return id;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(HistoryEntry {
            id,
            timestamp: Utc::now(),
            operation: operation.to_string(),
            details: details.into(),
        });
        id
    }

    pub fn list(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
