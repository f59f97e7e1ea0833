use serde::Serialize;

use crate::core::{Dataset, JunctionError, Provenance, Row, SelectionKey, TableMetadata};

/// Which rows of the source table a selection currently holds.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowScope {
    Sample,
    Page { offset: usize, limit: usize },
}

/// A table pinned into the working set. It owns a copy of the catalog
/// metadata, so later catalog refreshes never change a composition in progress.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SelectedTable {
    pub key: SelectionKey,
    pub metadata: TableMetadata,
    pub rows: Vec<Row>,
    pub scope: RowScope,
}

impl SelectedTable {
    pub fn new(key: SelectionKey, metadata: TableMetadata) -> Self {
        Self {
            key,
            rows: metadata.sample_rows.clone(),
            metadata,
            scope: RowScope::Sample,
        }
    }

    /// A copy of this selection holding one fetched page instead of the sample.
    pub fn with_page(&self, offset: usize, limit: usize, rows: Vec<Row>) -> Self {
        Self {
            key: self.key.clone(),
            metadata: self.metadata.clone(),
            rows,
            scope: RowScope::Page { offset, limit },
        }
    }

    /// Name used to qualify this table's columns in join results.
    pub fn label(&self) -> &str {
        &self.key.table_name
    }

    pub fn to_dataset(&self) -> Dataset {
        Dataset::new(
            self.metadata.field_names(),
            self.rows.clone(),
            Provenance::Table {
                key: self.key.clone(),
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleResult {
    Selected,
    Deselected,
}

/// Ordered working set of selected tables, unique by key.
#[derive(Debug, Default, Clone)]
pub struct SelectionSet {
    tables: Vec<SelectedTable>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deselects `key` if present, otherwise appends a snapshot of `metadata`.
    pub fn toggle(&mut self, key: SelectionKey, metadata: TableMetadata) -> ToggleResult {
        match self.position(&key) {
            Some(idx) => {
                self.tables.remove(idx);
                ToggleResult::Deselected
            }
            None => {
                self.tables.push(SelectedTable::new(key, metadata));
                ToggleResult::Selected
            }
        }
    }

    /// Swaps in a new snapshot for an already selected table, keeping its position.
    pub fn replace(&mut self, table: SelectedTable) -> Result<(), JunctionError> {
        let idx = self
            .position(&table.key)
            .ok_or_else(|| JunctionError::UnknownTable(table.key.to_string()))?;
        self.tables[idx] = table;
        Ok(())
    }

    pub fn list(&self) -> &[SelectedTable] {
        &self.tables
    }

    pub fn get(&self, key: &SelectionKey) -> Option<&SelectedTable> {
        self.tables.iter().find(|t| &t.key == key)
    }

    pub fn require(&self, key: &SelectionKey) -> Result<&SelectedTable, JunctionError> {
        self.get(key)
            .ok_or_else(|| JunctionError::UnknownTable(key.to_string()))
    }

    pub fn contains(&self, key: &SelectionKey) -> bool {
        self.position(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn position(&self, key: &SelectionKey) -> Option<usize> {
        self.tables.iter().position(|t| &t.key == key)
    }
}
