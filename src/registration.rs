//! Definition registration with bounded, attempt-indexed retry.
//!
//! The retry loop is bounded by attempt count only. Callers that need a
//! wall-clock deadline wrap the call in their own timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::client::types::{TaskDef, WorkflowDef};
use crate::client::OrchestrationClient;
use crate::error::{HarnessError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maps a zero-based attempt index to the delay slept after that attempt fails.
#[derive(Clone)]
pub struct BackoffPolicy {
    delay_fn: Arc<dyn Fn(u32) -> Duration + Send + Sync>,
}

impl BackoffPolicy {
    /// `delay(attempt) = (attempt + offset) * unit`.
    pub fn linear(unit: Duration, offset: u32) -> Self {
        Self::from_fn(move |attempt| unit.saturating_mul(attempt.saturating_add(offset)))
    }

    /// Retry immediately.
    pub fn none() -> Self {
        Self::from_fn(|_| Duration::ZERO)
    }

    pub fn from_fn<F>(delay_fn: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            delay_fn: Arc::new(delay_fn),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        (self.delay_fn)(attempt)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::linear(Duration::from_secs(1), 2)
    }
}

impl std::fmt::Debug for BackoffPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffPolicy")
            .field("first_delay", &self.delay(0))
            .finish()
    }
}

/// Bookkeeping for the retry loop; dropped on success or exhaustion.
struct RegistrationAttempt {
    number: u32,
    last_error: Option<HarnessError>,
}

pub struct RegistrationRetrier {
    client: Arc<dyn OrchestrationClient>,
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RegistrationRetrier {
    pub fn new(
        client: Arc<dyn OrchestrationClient>,
        max_attempts: u32,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            max_attempts,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Register (upsert) a workflow definition.
    pub async fn register_workflow(&self, def: &WorkflowDef) -> Result<()> {
        self.retry(&def.label(), move || self.client.register_workflow_def(def, true))
            .await
    }

    pub async fn register_task_defs(&self, defs: &[TaskDef]) -> Result<()> {
        let label = defs
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.retry(&format!("task defs [{label}]"), move || {
            self.client.register_task_defs(defs)
        })
        .await
    }

    /// Run `register` until it succeeds or `max_attempts` calls have failed.
    /// Re-registration is not deduplicated; the service is expected to upsert.
    pub async fn retry<F, Fut>(&self, definition: &str, mut register: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.max_attempts == 0 {
            return Err(HarnessError::Config(format!(
                "cannot register {definition}: registration ceiling is 0 attempts"
            )));
        }

        let mut attempt = RegistrationAttempt {
            number: 0,
            last_error: None,
        };

        while attempt.number < self.max_attempts {
            match register().await {
                Ok(()) => {
                    tracing::debug!(
                        definition = definition,
                        attempts = attempt.number + 1,
                        "Registered definition"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        definition = definition,
                        attempt = attempt.number + 1,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Failed to register definition"
                    );
                    if attempt.number + 1 < self.max_attempts {
                        tokio::time::sleep(self.backoff.delay(attempt.number)).await;
                    }
                    attempt.last_error = Some(e);
                }
            }
            attempt.number += 1;
        }

        Err(HarnessError::RegistrationExhausted {
            definition: definition.to_string(),
            attempts: attempt.number,
            last_error: attempt
                .last_error
                .map(|e| e.to_string())
                .unwrap_or_default(),
        })
    }
}
