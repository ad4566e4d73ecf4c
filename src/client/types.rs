use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution status of a workflow instance as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Terminated,
    Paused,
}

impl WorkflowStatus {
    /// Whether the engine will never move the instance out of this status.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Failed
                | WorkflowStatus::TimedOut
                | WorkflowStatus::Terminated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Running => "RUNNING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Failed => "FAILED",
            WorkflowStatus::TimedOut => "TIMED_OUT",
            WorkflowStatus::Terminated => "TERMINATED",
            WorkflowStatus::Paused => "PAUSED",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of a single workflow instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default)]
    pub reason_for_incompletion: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub workflow_version: Option<i32>,
}

/// A workflow definition. Only the identity fields are typed; the rest of
/// the definition (tasks, timeouts, ...) is carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: i32,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

fn default_version() -> i32 {
    1
}

impl WorkflowDef {
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
            body: Map::new(),
        }
    }

    /// `name:version`, used in logs and errors.
    pub fn label(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub name: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub input: Map<String, Value>,
}

impl StartWorkflowRequest {
    /// A request with an empty input and no correlation id.
    pub fn new(name: impl Into<String>, version: Option<i32>) -> Self {
        Self {
            name: name.into(),
            version,
            correlation_id: None,
            input: Map::new(),
        }
    }

    pub fn for_def(def: &WorkflowDef) -> Self {
        Self::new(def.name.clone(), Some(def.version))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckStatus {
    #[serde(default)]
    pub health_results: Vec<Health>,
    #[serde(default)]
    pub suppressed_health_results: Vec<Health>,
    #[serde(default)]
    pub healthy: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub healthy: bool,
}
