//! Entry points used by test scenarios.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::types::{StartWorkflowRequest, TaskDef, WorkflowDef};
use crate::context::HarnessContext;
use crate::error::Result;
use crate::monitor::ExpectedOutcome;

/// Register a workflow definition, retrying with backoff.
pub async fn validate_workflow_registration(ctx: &HarnessContext, def: &WorkflowDef) -> Result<()> {
    ctx.retrier().register_workflow(def).await
}

/// Register task definitions once; failures are returned as-is.
pub async fn validate_task_registration(ctx: &HarnessContext, defs: &[TaskDef]) -> Result<()> {
    ctx.client.register_task_defs(defs).await.map_err(|e| {
        tracing::debug!(error = %e, count = defs.len(), "Failed to validate task registration");
        e
    })
}

/// Register, start one instance with empty input, wait for it to finish
/// within `timeout` and check it against `expected`.
pub async fn validate_workflow(
    ctx: &HarnessContext,
    def: &WorkflowDef,
    timeout: Duration,
    expected: impl Into<ExpectedOutcome>,
) -> Result<()> {
    let expected = expected.into();
    validate_workflow_registration(ctx, def).await?;

    let workflow_id = ctx
        .client
        .start_workflow(&StartWorkflowRequest::for_def(def))
        .await?;
    tracing::debug!(workflow_id = %workflow_id, workflow = %def.label(), "Started workflow");

    let workflow = ctx.monitor().monitor(&workflow_id, timeout).await?;
    tracing::debug!(workflow_id = %workflow_id, status = %workflow.status, "Workflow completed");

    expected.check(&workflow)
}

/// Run `amount` instances of `def` concurrently; every one must complete
/// within the shared `timeout`.
pub async fn validate_workflow_bulk(
    ctx: &HarnessContext,
    def: &WorkflowDef,
    timeout: Duration,
    amount: usize,
) -> Result<()> {
    ctx.bulk().run(def, amount, timeout).await?.verdict()
}

/// Sleep `wait_time`, query `workflow_id` once and send the verdict on
/// `results`. A workflow that has not finished yet counts as a mismatch.
///
/// Meant to be spawned so the caller can keep working:
///
/// ```ignore
/// tokio::spawn(validate_workflow_daemon(ctx.clone(), wait, tx.clone(), id, expected));
/// ```
pub async fn validate_workflow_daemon(
    ctx: HarnessContext,
    wait_time: Duration,
    results: mpsc::Sender<Result<()>>,
    workflow_id: String,
    expected: ExpectedOutcome,
) {
    let verdict = match ctx.monitor().check_after(wait_time, &workflow_id).await {
        Ok(workflow) => expected.check(&workflow),
        Err(e) => Err(e),
    };

    if results.send(verdict).await.is_err() {
        tracing::warn!(workflow_id = %workflow_id, "Daemon verdict dropped, receiver is gone");
    }
}

/// Start `quantity` instances of the latest version of `name`, one after
/// another, without monitoring. Stops at the first failed start.
pub async fn start_workflows(ctx: &HarnessContext, quantity: usize, name: &str) -> Result<Vec<String>> {
    let request = StartWorkflowRequest::new(name, None);
    let mut workflow_ids = Vec::with_capacity(quantity);

    for _ in 0..quantity {
        let workflow_id = ctx.client.start_workflow(&request).await?;
        tracing::debug!(workflow_name = name, workflow_id = %workflow_id, "Started workflow");
        workflow_ids.push(workflow_id);
    }

    Ok(workflow_ids)
}
