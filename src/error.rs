use std::time::Duration;

use thiserror::Error;

use crate::client::types::WorkflowStatus;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Orchestration API error: {0}")]
    Transport(String),

    #[error("Failed to register {definition} after {attempts} attempts: {last_error}")]
    RegistrationExhausted {
        definition: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Workflow {workflow_id} did not reach a terminal state within {timeout:?}")]
    Timeout {
        workflow_id: String,
        timeout: Duration,
    },

    #[error("Workflow {workflow_id} finished with status {observed}, expected {expected}")]
    StatusMismatch {
        workflow_id: String,
        expected: WorkflowStatus,
        observed: WorkflowStatus,
    },

    #[error("Workflow {workflow_id} output differs at {path}: expected {expected}, observed {observed}")]
    OutputMismatch {
        workflow_id: String,
        path: String,
        expected: String,
        observed: String,
    },

    #[error("Monitor for workflow {workflow_id} stopped without delivering a result")]
    MissingResult { workflow_id: String },

    #[error("{} of {} workflow instances failed: {}", .failures.len(), .total, render_failures(.failures))]
    Bulk {
        total: usize,
        failures: Vec<InstanceFailure>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// One failing slot of a bulk run.
#[derive(Debug, Clone)]
pub struct InstanceFailure {
    pub index: usize,
    /// `None` when the instance never started.
    pub workflow_id: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for InstanceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.workflow_id {
            Some(id) => write!(f, "#{} ({id}): {}", self.index, self.reason),
            None => write!(f, "#{} (not started): {}", self.index, self.reason),
        }
    }
}

fn render_failures(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl HarnessError {
    /// True for the "still running" class of failures, as opposed to a wrong outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
