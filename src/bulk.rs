//! Many concurrent start → monitor → validate cycles with one verdict.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::client::types::{StartWorkflowRequest, Workflow, WorkflowDef, WorkflowStatus};
use crate::client::OrchestrationClient;
use crate::error::{HarnessError, InstanceFailure, Result};
use crate::monitor::{deadline_after, ExecutionMonitor, ExecutionWatch};
use crate::registration::RegistrationRetrier;

/// A started (or failed-to-start) instance of a bulk run.
pub struct RunningWorkflow {
    pub index: usize,
    pub workflow_id: Option<String>,
    pub err: Option<HarnessError>,
    pub completed: Option<Workflow>,
    watch: Option<ExecutionWatch>,
}

impl RunningWorkflow {
    /// True once the instance has a result or an error.
    pub fn is_resolved(&self) -> bool {
        self.err.is_some() || self.completed.is_some()
    }
}

/// The observed end state of one instance.
#[derive(Debug)]
pub struct WorkflowRunResult {
    pub index: usize,
    pub workflow_id: Option<String>,
    pub workflow: Option<Workflow>,
    pub error: Option<HarnessError>,
}

impl WorkflowRunResult {
    fn from_running(running: RunningWorkflow) -> Self {
        let error = match (running.err, &running.completed, &running.workflow_id) {
            (Some(e), _, _) => Some(e),
            (None, None, Some(id)) => Some(HarnessError::MissingResult {
                workflow_id: id.clone(),
            }),
            (None, None, None) => Some(HarnessError::Transport(
                "instance was never started".to_string(),
            )),
            (None, Some(_), _) => None,
        };

        Self {
            index: running.index,
            workflow_id: running.workflow_id,
            workflow: running.completed,
            error,
        }
    }

    pub fn status(&self) -> Option<WorkflowStatus> {
        self.workflow.as_ref().map(|w| w.status)
    }

    fn failure(&self, expected: WorkflowStatus) -> Option<InstanceFailure> {
        let reason = match (&self.error, &self.workflow) {
            (Some(e), _) => e.to_string(),
            (None, Some(w)) if w.status != expected => format!(
                "finished with status {}, expected {expected}{}",
                w.status,
                w.reason_for_incompletion
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            ),
            (None, Some(_)) => return None,
            (None, None) => "no result observed".to_string(),
        };

        Some(InstanceFailure {
            index: self.index,
            workflow_id: self.workflow_id.clone(),
            reason,
        })
    }
}

/// One result per requested instance, in request order.
#[derive(Debug)]
pub struct BulkOutcome {
    pub results: Vec<WorkflowRunResult>,
    pub expected_status: WorkflowStatus,
}

impl BulkOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Every failing instance, ordered by index.
    pub fn failures(&self) -> Vec<InstanceFailure> {
        self.results
            .iter()
            .filter_map(|r| r.failure(self.expected_status))
            .collect()
    }

    pub fn first_failure(&self) -> Option<InstanceFailure> {
        self.failures().into_iter().next()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn verdict(&self) -> Result<()> {
        let failures = self.failures();
        if failures.is_empty() {
            return Ok(());
        }
        Err(HarnessError::Bulk {
            total: self.results.len(),
            failures,
        })
    }
}

pub struct BulkValidator {
    client: Arc<dyn OrchestrationClient>,
    retrier: RegistrationRetrier,
    monitor: ExecutionMonitor,
}

impl BulkValidator {
    pub fn new(
        client: Arc<dyn OrchestrationClient>,
        retrier: RegistrationRetrier,
        monitor: ExecutionMonitor,
    ) -> Self {
        Self {
            client,
            retrier,
            monitor,
        }
    }

    /// Start every request concurrently. A failed start is recorded in that
    /// instance's slot and never prevents the others from starting. With
    /// `wait_for_completion`, each started instance gets a watch.
    pub async fn start_workflows(
        &self,
        wait_for_completion: bool,
        requests: Vec<StartWorkflowRequest>,
    ) -> Vec<RunningWorkflow> {
        let starts = requests.iter().map(|request| self.client.start_workflow(request));
        let started = join_all(starts).await;

        started
            .into_iter()
            .enumerate()
            .map(|(index, result)| match result {
                Ok(workflow_id) => {
                    tracing::debug!(index, workflow_id = %workflow_id, "Started workflow");
                    let watch = wait_for_completion.then(|| self.monitor.watch(&workflow_id));
                    RunningWorkflow {
                        index,
                        workflow_id: Some(workflow_id),
                        err: None,
                        completed: None,
                        watch,
                    }
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "Failed to start workflow");
                    RunningWorkflow {
                        index,
                        workflow_id: None,
                        err: Some(e),
                        completed: None,
                        watch: None,
                    }
                }
            })
            .collect()
    }

    /// Wait for every watched instance under one shared deadline. Instances
    /// still unresolved when it passes are marked timed out.
    pub async fn wait_for_running_workflows_until_timeout(
        &self,
        timeout: Duration,
        running: &mut [RunningWorkflow],
    ) {
        let deadline = deadline_after(timeout);

        let waits = running.iter_mut().filter_map(|instance| {
            let watch = instance.watch.take()?;
            Some(async move {
                match watch.wait_until(deadline, timeout).await {
                    Ok(workflow) => instance.completed = Some(workflow),
                    Err(e) => instance.err = Some(e),
                }
            })
        });
        join_all(waits).await;
    }

    /// Register `def`, start `amount` instances of it, and collect their
    /// terminal states within `timeout`. Only registration exhaustion is
    /// returned as an error; per-instance problems live in the outcome.
    pub async fn run(&self, def: &WorkflowDef, amount: usize, timeout: Duration) -> Result<BulkOutcome> {
        self.retrier.register_workflow(def).await?;

        let requests = (0..amount)
            .map(|_| StartWorkflowRequest::for_def(def))
            .collect();
        let mut running = self.start_workflows(true, requests).await;
        self.wait_for_running_workflows_until_timeout(timeout, &mut running)
            .await;

        let outcome = BulkOutcome {
            results: running
                .into_iter()
                .map(WorkflowRunResult::from_running)
                .collect(),
            expected_status: WorkflowStatus::Completed,
        };

        let failed = outcome.failures().len();
        if failed == 0 {
            tracing::info!(workflow = %def.label(), amount, "Bulk run completed successfully");
        } else {
            tracing::error!(workflow = %def.label(), amount, failed, "Bulk run had failing instances");
        }
        Ok(outcome)
    }
}
