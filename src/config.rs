use serde::Deserialize;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::registration::BackoffPolicy;

/// Legacy environment names understood by the existing test suites.
pub const SERVER_URL_ENV: &str = "CONDUCTOR_SERVER_URL";
pub const KEY_ID_ENV: &str = "KEY";
pub const KEY_SECRET_ENV: &str = "SECRET";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub key_secret: Option<String>,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

// Manual Debug impl to avoid leaking the key secret
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &self.key_secret.as_ref().map(|_| "[REDACTED]"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key_id: None,
            key_secret: None,
            token_ttl_secs: default_token_ttl(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    #[serde(default = "default_backoff_offset")]
    pub backoff_offset: u32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            backoff_offset: default_backoff_offset(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json_logs")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json_logs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_token_ttl() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_backoff_offset() -> u32 {
    2
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_json_logs() -> bool {
    true
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(
                config::File::with_name("workflow-harness")
                    .required(false),
            );
        }

        // Environment variable overrides with HARNESS_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("HARNESS")
                .separator("__")
                .try_parsing(true),
        );

        builder = builder
            .set_override_option("server.base_url", std::env::var(SERVER_URL_ENV).ok())
            .and_then(|b| b.set_override_option("server.key_id", std::env::var(KEY_ID_ENV).ok()))
            .and_then(|b| {
                b.set_override_option("server.key_secret", std::env::var(KEY_SECRET_ENV).ok())
            })
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        let config = builder
            .build()
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.registration.max_attempts == 0 {
            return Err(HarnessError::Config(
                "registration.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.server.base_url.trim().is_empty() {
            return Err(HarnessError::Config("server.base_url is empty".to_string()));
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::linear(
            Duration::from_millis(self.registration.backoff_unit_ms),
            self.registration.backoff_offset,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_retry_policy() {
        let config = AppConfig::default();
        assert_eq!(config.registration.max_attempts, 5);

        let policy = config.backoff_policy();
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(6));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
base_url = "http://conductor.test/api"
key_secret = "hunter2"

[registration]
max_attempts = 3
backoff_unit_ms = 0

[monitor]
poll_interval_ms = 25
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        if std::env::var(SERVER_URL_ENV).is_err() {
            assert_eq!(config.server.base_url, "http://conductor.test/api");
        }
        assert_eq!(config.registration.max_attempts, 3);
        assert_eq!(config.backoff_policy().delay(3), Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.logging.level, "error");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[registration]\nmax_attempts = 0").unwrap();

        let err = AppConfig::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let server = ServerConfig {
            key_secret: Some("hunter2".to_string()),
            ..ServerConfig::default()
        };
        let rendered = format!("{server:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
