#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use workflow_harness::client::types::*;
use workflow_harness::client::OrchestrationClient;
use workflow_harness::registration::BackoffPolicy;
use workflow_harness::{HarnessContext, HarnessError, Result};

/// Scripted in-memory orchestration service.
pub struct StubClient {
    /// Registrations fail this many times before succeeding.
    register_failures: u32,
    pub register_calls: AtomicU32,
    pub task_register_calls: AtomicU32,
    fail_task_registration: bool,

    pub start_calls: AtomicUsize,
    scripted_ids: Mutex<VecDeque<String>>,
    /// Zero-based start call numbers that are refused.
    failing_starts: HashSet<usize>,
    /// Terminal status per start call number; missing entries use `default_status`.
    status_by_start: HashMap<usize, WorkflowStatus>,
    default_status: WorkflowStatus,
    output: Map<String, Value>,
    /// Queries answer RUNNING this many times before the final status.
    running_polls: usize,
    fail_queries: bool,

    started: Mutex<HashMap<String, usize>>,
    pub status_calls: AtomicUsize,
    polls: Mutex<HashMap<String, usize>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self {
            register_failures: 0,
            register_calls: AtomicU32::new(0),
            task_register_calls: AtomicU32::new(0),
            fail_task_registration: false,
            start_calls: AtomicUsize::new(0),
            scripted_ids: Mutex::new(VecDeque::new()),
            failing_starts: HashSet::new(),
            status_by_start: HashMap::new(),
            default_status: WorkflowStatus::Completed,
            output: Map::new(),
            running_polls: 0,
            fail_queries: false,
            started: Mutex::new(HashMap::new()),
            status_calls: AtomicUsize::new(0),
            polls: Mutex::new(HashMap::new()),
        }
    }

    pub fn failing_registrations(mut self, failures: u32) -> Self {
        self.register_failures = failures;
        self
    }

    pub fn failing_task_registration(mut self) -> Self {
        self.fail_task_registration = true;
        self
    }

    pub fn with_ids(self, ids: &[&str]) -> Self {
        *self.scripted_ids.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_start(mut self, call: usize) -> Self {
        self.failing_starts.insert(call);
        self
    }

    pub fn status_for_start(mut self, call: usize, status: WorkflowStatus) -> Self {
        self.status_by_start.insert(call, status);
        self
    }

    pub fn default_status(mut self, status: WorkflowStatus) -> Self {
        self.default_status = status;
        self
    }

    pub fn with_output(mut self, output: Map<String, Value>) -> Self {
        self.output = output;
        self
    }

    pub fn running_polls(mut self, polls: usize) -> Self {
        self.running_polls = polls;
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn into_context(self) -> (Arc<StubClient>, HarnessContext) {
        let stub = Arc::new(self);
        let ctx = HarnessContext::new(stub.clone())
            .with_backoff(BackoffPolicy::none(), 5)
            .with_poll_interval(Duration::from_millis(5));
        (stub, ctx)
    }
}

#[async_trait]
impl OrchestrationClient for StubClient {
    async fn register_workflow_def(&self, _def: &WorkflowDef, _overwrite: bool) -> Result<()> {
        let call = self.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.register_failures {
            return Err(HarnessError::Transport(format!(
                "registration refused on call {call}"
            )));
        }
        Ok(())
    }

    async fn register_task_defs(&self, _defs: &[TaskDef]) -> Result<()> {
        self.task_register_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_task_registration {
            return Err(HarnessError::Transport("task defs rejected".to_string()));
        }
        Ok(())
    }

    async fn start_workflow(&self, _request: &StartWorkflowRequest) -> Result<String> {
        let call = self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_starts.contains(&call) {
            return Err(HarnessError::Transport(format!("start refused on call {call}")));
        }
        let workflow_id = self
            .scripted_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("wf-{}", call + 1));
        self.started
            .lock()
            .unwrap()
            .insert(workflow_id.clone(), call);
        Ok(workflow_id)
    }

    async fn get_workflow(&self, workflow_id: &str, _include_tasks: bool) -> Result<Workflow> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(HarnessError::Transport("status query failed".to_string()));
        }

        let call = self
            .started
            .lock()
            .unwrap()
            .get(workflow_id)
            .copied()
            .ok_or_else(|| HarnessError::Transport(format!("unknown workflow {workflow_id}")))?;

        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let entry = polls.entry(workflow_id.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let status = if poll <= self.running_polls {
            WorkflowStatus::Running
        } else {
            self.status_by_start
                .get(&call)
                .copied()
                .unwrap_or(self.default_status)
        };

        Ok(Workflow {
            workflow_id: workflow_id.to_string(),
            status,
            output: self.output.clone(),
            reason_for_incompletion: None,
            workflow_name: Some("demo".to_string()),
            workflow_version: Some(1),
        })
    }

    async fn health(&self) -> Result<HealthCheckStatus> {
        Ok(HealthCheckStatus {
            healthy: true,
            ..HealthCheckStatus::default()
        })
    }
}

pub fn demo_def() -> WorkflowDef {
    WorkflowDef::new("demo", 1)
}
