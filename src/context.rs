use std::sync::Arc;
use std::time::Duration;

use crate::bulk::BulkValidator;
use crate::client::conductor::ConductorClient;
use crate::client::OrchestrationClient;
use crate::config::AppConfig;
use crate::monitor::ExecutionMonitor;
use crate::registration::{BackoffPolicy, RegistrationRetrier, DEFAULT_MAX_ATTEMPTS};

/// Everything a validation needs: the shared API client plus the retry and
/// polling policies. Built once and handed to every component.
#[derive(Clone)]
pub struct HarnessContext {
    pub client: Arc<dyn OrchestrationClient>,
    pub backoff: BackoffPolicy,
    pub max_attempts: u32,
    pub poll_interval: Duration,
}

impl HarnessContext {
    /// A context around an arbitrary client with the reference policies.
    pub fn new(client: Arc<dyn OrchestrationClient>) -> Self {
        Self {
            client,
            backoff: BackoffPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &AppConfig) -> crate::error::Result<Self> {
        let client = ConductorClient::new(&config.server)?;

        Ok(Self {
            client: Arc::new(client),
            backoff: config.backoff_policy(),
            max_attempts: config.registration.max_attempts,
            poll_interval: config.poll_interval(),
        })
    }

    /// A ceiling of 0 makes every registration fail with a config error.
    pub fn with_backoff(mut self, backoff: BackoffPolicy, max_attempts: u32) -> Self {
        self.backoff = backoff;
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn retrier(&self) -> RegistrationRetrier {
        RegistrationRetrier::new(
            Arc::clone(&self.client),
            self.max_attempts,
            self.backoff.clone(),
        )
    }

    pub fn monitor(&self) -> ExecutionMonitor {
        ExecutionMonitor::new(Arc::clone(&self.client), self.poll_interval)
    }

    pub fn bulk(&self) -> BulkValidator {
        BulkValidator::new(Arc::clone(&self.client), self.retrier(), self.monitor())
    }
}
