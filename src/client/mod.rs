pub mod conductor;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// The remote orchestration capabilities the harness drives.
///
/// Implementations are shared across every concurrently monitored
/// instance, so they must be safe to call from many tasks at once.
#[async_trait]
pub trait OrchestrationClient: Send + Sync {
    /// Register a workflow definition. With `overwrite`, an existing
    /// definition of the same name and version is replaced.
    async fn register_workflow_def(&self, def: &WorkflowDef, overwrite: bool) -> Result<()>;

    /// Register task definitions.
    async fn register_task_defs(&self, defs: &[TaskDef]) -> Result<()>;

    /// Start a workflow instance, returning its workflow id.
    async fn start_workflow(&self, request: &StartWorkflowRequest) -> Result<String>;

    /// Fetch the current execution state of a workflow instance.
    async fn get_workflow(&self, workflow_id: &str, include_tasks: bool) -> Result<Workflow>;

    /// Query the service health endpoint.
    async fn health(&self) -> Result<HealthCheckStatus>;
}
