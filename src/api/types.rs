use serde::{Deserialize, Serialize};

use crate::catalog::RefreshOutcome;
use crate::core::{Dataset, SelectionKey};
use crate::export::{Destination, ExportFormat};
use crate::selection::ToggleResult;
use crate::service::RunOutcome;

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshResponse {
    Updated { databases: usize, tables: usize },
    Superseded,
    Unreachable { error: String },
}

impl From<RefreshOutcome> for RefreshResponse {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Updated { databases, tables } => {
                RefreshResponse::Updated { databases, tables }
            }
            RefreshOutcome::Superseded => RefreshResponse::Superseded,
            RefreshOutcome::Unreachable(error) => RefreshResponse::Unreachable { error },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub key: SelectionKey,
    pub selected: bool,
}

impl ToggleResponse {
    pub fn new(key: SelectionKey, result: ToggleResult) -> Self {
        Self {
            key,
            selected: result == ToggleResult::Selected,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageRequest {
    pub key: SelectionKey,
    #[serde(default)]
    pub offset: usize,
    /// Defaults to the configured page size.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResponse {
    Completed {
        dataset: Dataset,
    },
    Failed {
        step_id: u64,
        position: usize,
        error: String,
        last_good: Dataset,
    },
}

impl From<RunOutcome> for RunResponse {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(dataset) => RunResponse::Completed { dataset },
            RunOutcome::Failed(failure) => RunResponse::Failed {
                step_id: failure.step_id,
                position: failure.position,
                error: failure.error.to_string(),
                last_good: failure.last_good,
            },
        }
    }
}

fn default_destination() -> Destination {
    Destination::Download
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(default = "default_destination")]
    pub destination: Destination,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeliveredResponse {
    pub destination: Destination,
    pub location: String,
    pub bytes: usize,
}
