//! Observing a started workflow until it reaches a terminal state.
//!
//! Two strategies are offered. [`ExecutionMonitor::watch`] spawns a poller
//! that delivers the terminal state over a one-shot channel, and the caller
//! waits on it with a deadline. [`ExecutionMonitor::check_after`] sleeps and
//! queries once, for cheap background checks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::client::types::{Workflow, WorkflowStatus};
use crate::client::OrchestrationClient;
use crate::error::{HarnessError, Result};
use crate::output;

/// Receiving half of a single-shot completion notification.
pub type CompletionReceiver = oneshot::Receiver<Result<Workflow>>;

/// What a finished workflow is expected to look like.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedOutcome {
    pub status: WorkflowStatus,
    /// When `None` the output is not checked.
    pub output: Option<Map<String, Value>>,
}

impl ExpectedOutcome {
    pub fn completed() -> Self {
        WorkflowStatus::Completed.into()
    }

    pub fn with_output(mut self, output: Map<String, Value>) -> Self {
        self.output = Some(output);
        self
    }

    /// Compare an observed workflow against this expectation.
    pub fn check(&self, workflow: &Workflow) -> Result<()> {
        if workflow.status != self.status {
            return Err(HarnessError::StatusMismatch {
                workflow_id: workflow.workflow_id.clone(),
                expected: self.status,
                observed: workflow.status,
            });
        }

        if let Some(expected) = &self.output {
            if let Some(diff) = output::first_difference(expected, &workflow.output) {
                return Err(HarnessError::OutputMismatch {
                    workflow_id: workflow.workflow_id.clone(),
                    path: diff.display_path().to_string(),
                    expected: output::render(&diff.expected),
                    observed: output::render(&diff.observed),
                });
            }
        }

        Ok(())
    }
}

impl From<WorkflowStatus> for ExpectedOutcome {
    fn from(status: WorkflowStatus) -> Self {
        Self {
            status,
            output: None,
        }
    }
}

/// A running poller for one workflow. Dropping the watch cancels the poller.
pub struct ExecutionWatch {
    workflow_id: String,
    receiver: CompletionReceiver,
    _cancel_on_drop: DropGuard,
}

impl ExecutionWatch {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub async fn wait(self, timeout: Duration) -> Result<Workflow> {
        self.wait_until(deadline_after(timeout), timeout).await
    }

    /// Wait until `deadline`; `budget` is only used to describe a timeout.
    pub async fn wait_until(self, deadline: Instant, budget: Duration) -> Result<Workflow> {
        let ExecutionWatch {
            workflow_id,
            receiver,
            _cancel_on_drop,
        } = self;
        await_completion(&workflow_id, receiver, deadline, budget).await
    }
}

/// Bounded wait on a completion channel fed by any producer.
pub async fn wait_for_completion_until_timeout(
    workflow_id: &str,
    receiver: CompletionReceiver,
    timeout: Duration,
) -> Result<Workflow> {
    await_completion(workflow_id, receiver, deadline_after(timeout), timeout).await
}

/// Roughly thirty years; stands in for budgets too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
pub fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

async fn await_completion(
    workflow_id: &str,
    receiver: CompletionReceiver,
    deadline: Instant,
    budget: Duration,
) -> Result<Workflow> {
    match tokio::time::timeout_at(deadline, receiver).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(HarnessError::MissingResult {
            workflow_id: workflow_id.to_string(),
        }),
        Err(_) => {
            tracing::debug!(workflow_id = %workflow_id, timeout = ?budget, "Gave up waiting for workflow");
            Err(HarnessError::Timeout {
                workflow_id: workflow_id.to_string(),
                timeout: budget,
            })
        }
    }
}

#[derive(Clone)]
pub struct ExecutionMonitor {
    client: Arc<dyn OrchestrationClient>,
    poll_interval: Duration,
}

impl ExecutionMonitor {
    pub fn new(client: Arc<dyn OrchestrationClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Start tracking `workflow_id`. The poller runs until the workflow is
    /// terminal, a status query fails, or the watch is dropped.
    pub fn watch(&self, workflow_id: &str) -> ExecutionWatch {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        tokio::spawn(poll_until_terminal(
            Arc::clone(&self.client),
            workflow_id.to_string(),
            self.poll_interval,
            tx,
            cancel.clone(),
        ));

        ExecutionWatch {
            workflow_id: workflow_id.to_string(),
            receiver: rx,
            _cancel_on_drop: cancel.drop_guard(),
        }
    }

    /// Watch and wait for the terminal state, giving up after `timeout`.
    pub async fn monitor(&self, workflow_id: &str, timeout: Duration) -> Result<Workflow> {
        self.watch(workflow_id).wait(timeout).await
    }

    /// Sleep for `wait_time`, then query the status exactly once. Whatever
    /// status is observed is returned, terminal or not.
    pub async fn check_after(&self, wait_time: Duration, workflow_id: &str) -> Result<Workflow> {
        tokio::time::sleep(wait_time).await;
        self.client.get_workflow(workflow_id, false).await
    }
}

async fn poll_until_terminal(
    client: Arc<dyn OrchestrationClient>,
    workflow_id: String,
    poll_interval: Duration,
    mut tx: oneshot::Sender<Result<Workflow>>,
    cancel: CancellationToken,
) {
    loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            polled = client.get_workflow(&workflow_id, false) => polled,
        };

        match polled {
            Ok(workflow) if workflow.status.is_terminal() => {
                tracing::debug!(
                    workflow_id = %workflow_id,
                    status = %workflow.status,
                    "Workflow reached terminal state"
                );
                let _ = tx.send(Ok(workflow));
                return;
            }
            Ok(workflow) => {
                tracing::trace!(workflow_id = %workflow_id, status = %workflow.status, "Workflow still in progress");
            }
            // Query failures are surfaced, not retried.
            Err(e) => {
                tracing::debug!(workflow_id = %workflow_id, error = %e, "Status query failed");
                let _ = tx.send(Err(e));
                return;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
