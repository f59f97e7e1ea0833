use log::info;

use crate::conf::SessionConfig;
use crate::core::{Dataset, JunctionError, Provenance, SelectionKey, TableMetadata};
use crate::history::{self, HistoryEntry, HistoryLedger};
use crate::join::{self, JoinSpec};
use crate::pipeline::{Pipeline, PipelineFailure, StepConfig, TransformationStep};
use crate::profile::{self, ProfilingReport};
use crate::selection::{SelectedTable, SelectionSet, ToggleResult};

/// Result of running the pipeline once its preconditions hold.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Dataset),
    Failed(PipelineFailure),
}

/// One user's composition state: the working set, the pipeline, the audit
/// log and the datasets produced so far.
#[derive(Debug)]
pub struct Session {
    selection: SelectionSet,
    pipeline: Pipeline,
    history: HistoryLedger,
    /// Input of the next pipeline run: the latest join result, if any.
    base: Option<Dataset>,
    /// Last successfully produced dataset.
    current: Option<Dataset>,
}

impl Session {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            selection: SelectionSet::new(),
            pipeline: Pipeline::new(),
            history: HistoryLedger::new(config.history_capacity),
            base: None,
            current: None,
        }
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.list()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.current.as_ref()
    }

    pub fn toggle(&mut self, key: SelectionKey, metadata: TableMetadata) -> ToggleResult {
        let result = self.selection.toggle(key.clone(), metadata);
        match result {
            ToggleResult::Selected => {
                self.history.append(history::TABLE_SELECTED, key.to_string());
            }
            ToggleResult::Deselected => {
                self.forget(&key);
                self.history.append(history::TABLE_DESELECTED, key.to_string());
            }
        }
        result
    }

    /// Replaces a selected table's rows with a fetched page.
    pub fn load_page(&mut self, table: SelectedTable) -> Result<(), JunctionError> {
        let details = format!("{} ({} rows)", table.key, table.rows.len());
        self.selection.replace(table)?;
        self.history.append(history::PAGE_LOADED, details);
        Ok(())
    }

    pub fn join(&mut self, spec: &JoinSpec) -> Result<Dataset, JunctionError> {
        self.require_selected(2, "join")?;
        let dataset = join::execute(spec, &self.selection)?;
        self.history.append(
            history::JOIN_EXECUTED,
            format!(
                "{} join of {} and {} ({} rows)",
                spec.join_type,
                spec.left,
                spec.right,
                dataset.row_count()
            ),
        );
        self.base = Some(dataset.clone());
        self.current = Some(dataset.clone());
        Ok(dataset)
    }

    pub fn add_step(&mut self, config: StepConfig) -> Result<TransformationStep, JunctionError> {
        self.require_selected(1, "transformations")?;
        let id = self.pipeline.append(config);
        let step = self
            .pipeline
            .get(id)
            .cloned()
            .ok_or(JunctionError::StepNotFound(id))?;
        self.history.append(
            history::TRANSFORMATION_ADDED,
            format!("{} (step {})", step.kind, step.id),
        );
        Ok(step)
    }

    pub fn remove_step(&mut self, step_id: u64) -> Result<TransformationStep, JunctionError> {
        let step = self.pipeline.remove(step_id)?;
        self.history.append(
            history::TRANSFORMATION_REMOVED,
            format!("{} (step {})", step.kind, step.id),
        );
        Ok(step)
    }

    pub fn clear_pipeline(&mut self) {
        let removed = self.pipeline.len();
        self.pipeline.clear();
        self.history
            .append(history::PIPELINE_CLEARED, format!("{} steps removed", removed));
    }

    /// Runs the pipeline over the latest join result, or over the first
    /// selected table when nothing has been joined.
    pub fn run_pipeline(&mut self) -> Result<RunOutcome, JunctionError> {
        self.require_selected(1, "transformations")?;
        let initial = match &self.base {
            Some(base) => base.clone(),
            None => self.selection.list()[0].to_dataset(),
        };

        match self.pipeline.run(&initial, &self.selection) {
            Ok(dataset) => {
                self.history.append(
                    history::TRANSFORMATIONS_EXECUTED,
                    format!(
                        "{} steps applied, {} rows",
                        self.pipeline.len(),
                        dataset.row_count()
                    ),
                );
                self.current = Some(dataset.clone());
                Ok(RunOutcome::Completed(dataset))
            }
            Err(failure) => Ok(RunOutcome::Failed(failure)),
        }
    }

    pub fn profile(&self) -> Result<Vec<ProfilingReport>, JunctionError> {
        self.require_selected(1, "profiling")?;
        Ok(profile::profile(self.selection.list()))
    }

    /// The dataset an export would serialize: the last result, or the first
    /// selected table.
    pub fn export_source(&self) -> Result<Dataset, JunctionError> {
        if let Some(current) = &self.current {
            return Ok(current.clone());
        }
        self.selection
            .list()
            .first()
            .map(SelectedTable::to_dataset)
            .ok_or_else(|| {
                JunctionError::SelectionError("nothing to export: no table is selected".to_string())
            })
    }

    pub fn record_export(&mut self, details: String) {
        self.history.append(history::DATASET_EXPORTED, details);
    }

    fn require_selected(&self, min: usize, what: &str) -> Result<(), JunctionError> {
        let selected = self.selection.len();
        if selected < min {
            return Err(JunctionError::SelectionError(format!(
                "{} requires at least {} selected table{} ({} selected)",
                what,
                min,
                if min == 1 { "" } else { "s" },
                selected
            )));
        }
        Ok(())
    }

    /// Drops results derived from a table that left the working set.
    fn forget(&mut self, key: &SelectionKey) {
        let name = key.to_string();
        let derived = |dataset: &Dataset| derives_from(dataset.provenance(), key, &name);
        if self.base.as_ref().is_some_and(derived) {
            self.base = None;
        }
        if self.current.as_ref().is_some_and(derived) {
            info!("discarding dataset derived from deselected table {}", key);
            self.current = None;
        }
    }
}

fn derives_from(provenance: &Provenance, key: &SelectionKey, name: &str) -> bool {
    match provenance {
        Provenance::Table { key: source } => source == key,
        Provenance::Join { left, right, .. } => left == name || right == name,
        Provenance::Step { joined, parent, .. } => {
            joined.as_ref() == Some(key) || derives_from(parent, key, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldDescriptor, FieldType, Row, Value};
    use crate::join::{JoinCondition, JoinType, Operator};
    use crate::pipeline::{
        JoinStepConfig, SelectConfig, SortConfig, SortDirection, SortKey, StepStatus,
    };

    fn metadata(table: &str, fields: &[&str], rows: Vec<Row>) -> TableMetadata {
        TableMetadata {
            connection_id: "pg".to_string(),
            database: "production".to_string(),
            table_name: table.to_string(),
            fields: fields
                .iter()
                .map(|f| FieldDescriptor::new(*f, FieldType::Integer, true))
                .collect(),
            row_count: rows.len() as u64,
            sample_rows: rows,
        }
    }

    fn users() -> TableMetadata {
        let rows = (1..=3)
            .map(|i| Row::from_iter([("id".to_string(), Value::Number(i as f64))]))
            .collect();
        metadata("users", &["id"], rows)
    }

    fn orders() -> TableMetadata {
        let rows = [(10, 1), (11, 1), (12, 3)]
            .into_iter()
            .map(|(id, user)| {
                Row::from_iter([
                    ("id".to_string(), Value::Number(id as f64)),
                    ("user_id".to_string(), Value::Number(user as f64)),
                ])
            })
            .collect();
        metadata("orders", &["id", "user_id"], rows)
    }

    fn session() -> Session {
        Session::new(&SessionConfig::default())
    }

    fn spec() -> JoinSpec {
        JoinSpec {
            left: users().key(),
            right: orders().key(),
            join_type: JoinType::Inner,
            conditions: vec![JoinCondition::new("id", Operator::Eq, "user_id")],
        }
    }

    fn operations(session: &Session) -> Vec<String> {
        session.history().map(|e| e.operation.clone()).collect()
    }

    #[test]
    fn test_toggle_records_history() {
        let mut s = session();
        assert_eq!(s.toggle(users().key(), users()), ToggleResult::Selected);
        assert_eq!(s.toggle(users().key(), users()), ToggleResult::Deselected);
        assert_eq!(
            operations(&s),
            vec![history::TABLE_DESELECTED, history::TABLE_SELECTED]
        );
        assert_eq!(s.history().next().unwrap().details, "pg.production.users");
    }

    #[test]
    fn test_join_needs_two_tables() {
        let mut s = session();
        s.toggle(users().key(), users());
        let err = s.join(&spec()).unwrap_err();
        assert!(matches!(err, JunctionError::SelectionError(_)));
        assert_eq!(s.history().count(), 1);
    }

    #[test]
    fn test_join_success_and_failure() {
        let mut s = session();
        s.toggle(users().key(), users());
        s.toggle(orders().key(), orders());

        let mut bad = spec();
        bad.conditions.clear();
        assert!(matches!(
            s.join(&bad),
            Err(JunctionError::JoinConfigError(_))
        ));
        assert_eq!(s.history().count(), 2);

        let joined = s.join(&spec()).unwrap();
        assert_eq!(joined.row_count(), 3);
        assert_eq!(s.dataset(), Some(&joined));
        let latest = s.history().next().unwrap();
        assert_eq!(latest.operation, history::JOIN_EXECUTED);
        assert_eq!(
            latest.details,
            "INNER join of pg.production.users and pg.production.orders (3 rows)"
        );
    }

    #[test]
    fn test_pipeline_runs_over_join_result() {
        let mut s = session();
        s.toggle(users().key(), users());
        s.toggle(orders().key(), orders());
        s.join(&spec()).unwrap();

        s.add_step(StepConfig::Sort(SortConfig {
            keys: vec![SortKey {
                column: "orders.id".to_string(),
                direction: SortDirection::Desc,
            }],
        }))
        .unwrap();
        let RunOutcome::Completed(out) = s.run_pipeline().unwrap() else {
            panic!("expected a completed run");
        };
        let ids: Vec<Value> = out.column_values("orders.id").cloned().collect();
        assert_eq!(
            ids,
            vec![Value::Number(12.0), Value::Number(11.0), Value::Number(10.0)]
        );
        assert_eq!(s.history().next().unwrap().details, "1 steps applied, 3 rows");
    }

    #[test]
    fn test_failed_run_keeps_current() {
        let mut s = session();
        s.toggle(users().key(), users());
        let bad = s
            .add_step(StepConfig::SelectColumns(SelectConfig {
                columns: vec!["missing".to_string()],
            }))
            .unwrap();
        let history_len = s.history().count();

        let RunOutcome::Failed(failure) = s.run_pipeline().unwrap() else {
            panic!("expected a failed run");
        };
        assert_eq!(failure.step_id, bad.id);
        assert_eq!(failure.last_good, users_dataset());
        assert_eq!(s.dataset(), None);
        assert_eq!(s.pipeline().steps()[0].status, StepStatus::Failed);
        assert_eq!(s.history().count(), history_len);
    }

    fn users_dataset() -> Dataset {
        SelectedTable::new(users().key(), users()).to_dataset()
    }

    #[test]
    fn test_gating_for_transforms_and_profiling() {
        let mut s = session();
        assert!(matches!(
            s.run_pipeline(),
            Err(JunctionError::SelectionError(_))
        ));
        assert!(matches!(s.profile(), Err(JunctionError::SelectionError(_))));
        assert!(matches!(
            s.export_source(),
            Err(JunctionError::SelectionError(_))
        ));
        s.toggle(users().key(), users());
        assert_eq!(s.profile().unwrap().len(), 1);
        assert_eq!(s.export_source().unwrap(), users_dataset());
    }

    #[test]
    fn test_deselect_discards_derived_results() {
        let mut s = session();
        s.toggle(users().key(), users());
        s.toggle(orders().key(), orders());
        s.join(&spec()).unwrap();
        s.toggle(orders().key(), orders());
        assert_eq!(s.dataset(), None);
        // the remaining table becomes the pipeline input again
        let RunOutcome::Completed(out) = s.run_pipeline().unwrap() else {
            panic!("expected a completed run");
        };
        assert_eq!(out, users_dataset());
    }

    #[test]
    fn test_deselect_discards_pipeline_join_result() {
        let mut s = session();
        s.toggle(users().key(), users());
        s.toggle(orders().key(), orders());
        s.add_step(StepConfig::Join(JoinStepConfig {
            right: orders().key(),
            join_type: JoinType::Inner,
            conditions: vec![JoinCondition::new("id", Operator::Eq, "user_id")],
        }))
        .unwrap();
        let RunOutcome::Completed(out) = s.run_pipeline().unwrap() else {
            panic!("expected a completed run");
        };
        assert_eq!(out.row_count(), 3);
        assert!(matches!(
            out.provenance(),
            Provenance::Step { joined: Some(key), .. } if *key == orders().key()
        ));

        s.toggle(orders().key(), orders());
        assert_eq!(s.dataset(), None);
    }

    #[test]
    fn test_pipeline_edits_are_recorded() {
        let mut s = session();
        s.toggle(users().key(), users());
        let step = s
            .add_step(StepConfig::SelectColumns(SelectConfig {
                columns: vec!["id".to_string()],
            }))
            .unwrap();
        s.remove_step(step.id).unwrap();
        assert_eq!(s.remove_step(step.id), Err(JunctionError::StepNotFound(step.id)));
        s.clear_pipeline();
        assert_eq!(
            operations(&s),
            vec![
                history::PIPELINE_CLEARED,
                history::TRANSFORMATION_REMOVED,
                history::TRANSFORMATION_ADDED,
                history::TABLE_SELECTED,
            ]
        );
        assert_eq!(s.history().nth(2).unwrap().details, "selectColumns (step 1)");
    }

    #[test]
    fn test_load_page_requires_selection() {
        let mut s = session();
        let table = SelectedTable::new(users().key(), users());
        assert!(matches!(
            s.load_page(table.with_page(0, 2, Vec::new())),
            Err(JunctionError::UnknownTable(_))
        ));
        s.toggle(users().key(), users());
        s.load_page(table.with_page(0, 2, Vec::new())).unwrap();
        assert!(s.selection().list()[0].rows.is_empty());
        assert_eq!(s.history().next().unwrap().operation, history::PAGE_LOADED);
    }
}
