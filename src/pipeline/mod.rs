mod config;
mod expr;
mod ops;

use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Dataset, JunctionError};
use crate::selection::SelectionSet;

pub use config::{
    AggregateConfig, AggregateFn, CalculateConfig, CleanConfig, Combine, FilterConfig,
    JoinStepConfig, NullPolicy, Operand, PivotConfig, Predicate, SelectConfig, SortConfig,
    SortDirection, SortKey, StepConfig,
};
pub use expr::{Expr, ExprError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    Filter,
    SelectColumns,
    Aggregate,
    Join,
    Sort,
    Calculate,
    Pivot,
    Clean,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepKind::Filter => "filter",
            StepKind::SelectColumns => "selectColumns",
            StepKind::Aggregate => "aggregate",
            StepKind::Join => "join",
            StepKind::Sort => "sort",
            StepKind::Calculate => "calculate",
            StepKind::Pivot => "pivot",
            StepKind::Clean => "clean",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransformationStep {
    pub id: u64,
    pub position: usize,
    pub kind: StepKind,
    pub config: StepConfig,
    pub status: StepStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TransformationStep {
    pub fn new(id: u64, config: StepConfig) -> Self {
        Self {
            id,
            position: 0,
            kind: config.kind(),
            config,
            status: StepStatus::Pending,
            executed_at: None,
            error: None,
        }
    }

    fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.executed_at = None;
        self.error = None;
    }
}

/// A run that stopped at a failing step. `last_good` is the output of the
/// step before it, or the run's input when the first step failed.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("pipeline halted at step {step_id} (position {position}): {error}")]
pub struct PipelineFailure {
    pub step_id: u64,
    pub position: usize,
    pub error: JunctionError,
    pub last_good: Dataset,
}

/// Ordered transformation steps and the per-position outputs of the last run.
#[derive(Debug, Default)]
pub struct Pipeline {
    steps: Vec<TransformationStep>,
    stages: Vec<Dataset>,
    next_id: u64,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, config: StepConfig) -> u64 {
        self.next_id += 1;
        let mut step = TransformationStep::new(self.next_id, config);
        step.position = self.steps.len();
        self.steps.push(step);
        self.stages.clear();
        self.next_id
    }

    pub fn remove(&mut self, step_id: u64) -> Result<TransformationStep, JunctionError> {
        let idx = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or(JunctionError::StepNotFound(step_id))?;
        let removed = self.steps.remove(idx);
        for (position, step) in self.steps.iter_mut().enumerate() {
            step.position = position;
        }
        self.stages.clear();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.stages.clear();
    }

    pub fn steps(&self) -> &[TransformationStep] {
        &self.steps
    }

    pub fn get(&self, step_id: u64) -> Option<&TransformationStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Output of each completed step of the last run, by position.
    pub fn stages(&self) -> &[Dataset] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Applies every step in order, starting over from `initial`. Stops at the
    /// first failing step; steps after it stay pending.
    pub fn run(
        &mut self,
        initial: &Dataset,
        selection: &SelectionSet,
    ) -> Result<Dataset, PipelineFailure> {
        self.stages.clear();
        self.steps.iter_mut().for_each(TransformationStep::reset);

        info!(
            "running pipeline of {} steps over {} rows",
            self.steps.len(),
            initial.row_count()
        );

        for idx in 0..self.steps.len() {
            let input = self.stages.last().unwrap_or(initial);
            let result = ops::apply(&self.steps[idx], input, selection);
            let step = &mut self.steps[idx];
            step.executed_at = Some(Utc::now());

            match result {
                Ok(output) => {
                    debug!(
                        "step {} ({}) produced {} rows",
                        step.id,
                        step.kind,
                        output.row_count()
                    );
                    step.status = StepStatus::Completed;
                    self.stages.push(output);
                }
                Err(error) => {
                    warn!("step {} ({}) failed: {}", step.id, step.kind, error);
                    step.status = StepStatus::Failed;
                    step.error = Some(error.to_string());
                    return Err(PipelineFailure {
                        step_id: step.id,
                        position: idx,
                        error,
                        last_good: self.stages.last().unwrap_or(initial).clone(),
                    });
                }
            }
        }

        Ok(self.stages.last().unwrap_or(initial).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Provenance, Row, SelectionKey, Value};
    use crate::join::Operator;

    fn amounts() -> Dataset {
        let rows = [120.50, 89.99, 200.00, 75.25, 180.75]
            .into_iter()
            .map(|a| Row::from_iter([("amount".to_string(), Value::Number(a))]))
            .collect();
        Dataset::new(
            vec!["amount".to_string()],
            rows,
            Provenance::Table {
                key: SelectionKey::new("pg", "production", "orders"),
            },
        )
    }

    fn filter_over(threshold: f64) -> StepConfig {
        StepConfig::Filter(FilterConfig {
            predicates: vec![Predicate {
                column: "amount".to_string(),
                operator: Operator::Gt,
                operand: Operand::Value(Value::Number(threshold)),
            }],
            combine: Combine::All,
        })
    }

    fn sort_desc() -> StepConfig {
        StepConfig::Sort(SortConfig {
            keys: vec![SortKey {
                column: "amount".to_string(),
                direction: SortDirection::Desc,
            }],
        })
    }

    #[test]
    fn test_filter_then_sort() {
        let mut pipeline = Pipeline::new();
        pipeline.append(filter_over(100.0));
        pipeline.append(sort_desc());

        let out = pipeline.run(&amounts(), &SelectionSet::new()).unwrap();
        let values: Vec<Value> = out.column_values("amount").cloned().collect();
        assert_eq!(
            values,
            vec![Value::Number(200.0), Value::Number(180.75), Value::Number(120.5)]
        );
        assert!(pipeline
            .steps()
            .iter()
            .all(|s| s.status == StepStatus::Completed && s.executed_at.is_some()));
        assert_eq!(pipeline.stages().len(), 2);
        assert_eq!(pipeline.stages()[0].row_count(), 3);
    }

    #[test]
    fn test_failure_keeps_last_good_and_pending_tail() {
        let mut pipeline = Pipeline::new();
        pipeline.append(filter_over(100.0));
        let bad = pipeline.append(StepConfig::SelectColumns(SelectConfig {
            columns: vec!["profit".to_string()],
        }));
        pipeline.append(sort_desc());

        let failure = pipeline.run(&amounts(), &SelectionSet::new()).unwrap_err();
        assert_eq!(failure.step_id, bad);
        assert_eq!(failure.position, 1);
        assert_eq!(failure.last_good.row_count(), 3);
        assert!(matches!(failure.error, JunctionError::StepReferenceError { .. }));

        let statuses: Vec<StepStatus> = pipeline.steps().iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![StepStatus::Completed, StepStatus::Failed, StepStatus::Pending]
        );
        assert!(pipeline.steps()[1].error.is_some());
        assert!(pipeline.steps()[2].executed_at.is_none());
    }

    #[test]
    fn test_first_step_failure_returns_input() {
        let mut pipeline = Pipeline::new();
        pipeline.append(StepConfig::Calculate(CalculateConfig {
            column: "x".to_string(),
            expression: "amount / 0".to_string(),
        }));
        let failure = pipeline.run(&amounts(), &SelectionSet::new()).unwrap_err();
        assert_eq!(failure.last_good, amounts());
        assert!(matches!(failure.error, JunctionError::StepExecutionError { .. }));
    }

    #[test]
    fn test_rerun_after_removing_bad_step() {
        let mut pipeline = Pipeline::new();
        let bad = pipeline.append(StepConfig::SelectColumns(SelectConfig {
            columns: vec!["profit".to_string()],
        }));
        pipeline.append(sort_desc());
        assert!(pipeline.run(&amounts(), &SelectionSet::new()).is_err());

        pipeline.remove(bad).unwrap();
        assert_eq!(pipeline.steps()[0].position, 0);
        let out = pipeline.run(&amounts(), &SelectionSet::new()).unwrap();
        assert_eq!(out.row_count(), 5);
        assert_eq!(pipeline.steps()[0].status, StepStatus::Completed);
    }

    #[test]
    fn test_remove_unknown_and_clear() {
        let mut pipeline = Pipeline::new();
        let id = pipeline.append(sort_desc());
        assert_eq!(pipeline.remove(id + 10), Err(JunctionError::StepNotFound(id + 10)));
        pipeline.clear();
        assert!(pipeline.is_empty());
        // ids keep increasing across clears
        assert!(pipeline.append(sort_desc()) > id);
    }

    #[test]
    fn test_empty_pipeline_returns_input() {
        let mut pipeline = Pipeline::new();
        let out = pipeline.run(&amounts(), &SelectionSet::new()).unwrap();
        assert_eq!(out, amounts());
    }
}
