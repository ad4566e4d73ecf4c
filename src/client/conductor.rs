use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::client::types::*;
use crate::client::OrchestrationClient;
use crate::config::ServerConfig;
use crate::error::{HarnessError, Result};

const AUTH_HEADER: &str = "X-Authorization";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    key_id: &'a str,
    key_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// REST client for the orchestration service.
pub struct ConductorClient {
    client: Client,
    config: ServerConfig,
    /// Cached access token and its expiry.
    token_cache: Arc<RwLock<Option<(String, chrono::DateTime<chrono::Utc>)>>>,
}

impl ConductorClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        if config.key_id.is_some() != config.key_secret.is_some() {
            return Err(HarnessError::Config(
                "server.key_id and server.key_secret must be set together".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// The health endpoint lives beside the API prefix, not under it.
    fn health_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let root = base.strip_suffix("/api").unwrap_or(base);
        format!("{root}/health")
    }

    async fn access_token(&self) -> Result<Option<String>> {
        let (Some(key_id), Some(key_secret)) = (&self.config.key_id, &self.config.key_secret)
        else {
            return Ok(None);
        };

        // Check cache
        {
            let cache = self.token_cache.read().await;
            if let Some((token, expiry)) = cache.as_ref() {
                if *expiry > chrono::Utc::now() {
                    return Ok(Some(token.clone()));
                }
            }
        }

        let response = self
            .client
            .post(self.url("token"))
            .json(&TokenRequest {
                key_id,
                key_secret,
            })
            .send()
            .await?;
        let response = check_status(response, "POST", "token").await?;
        let token = response.json::<TokenResponse>().await?.token;

        let ttl = chrono::Duration::seconds(self.config.token_ttl_secs as i64);
        let mut cache = self.token_cache.write().await;
        *cache = Some((token.clone(), chrono::Utc::now() + ttl));

        tracing::debug!("Refreshed orchestration API token");
        Ok(Some(token))
    }

    async fn request(&self, method: Method, url: String) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.access_token().await? {
            builder = builder.header(AUTH_HEADER, token);
        }
        Ok(builder)
    }
}

async fn check_status(response: Response, method: &str, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HarnessError::Transport(format!(
        "{method} {path} returned {status}: {body}"
    )))
}

#[async_trait]
impl OrchestrationClient for ConductorClient {
    async fn register_workflow_def(&self, def: &WorkflowDef, overwrite: bool) -> Result<()> {
        let path = "metadata/workflow";
        let response = if overwrite {
            self.request(Method::PUT, self.url(path))
                .await?
                .json(std::slice::from_ref(def))
                .send()
                .await?
        } else {
            self.request(Method::POST, self.url(path))
                .await?
                .json(def)
                .send()
                .await?
        };

        let method = if overwrite { "PUT" } else { "POST" };
        check_status(response, method, path).await?;
        Ok(())
    }

    async fn register_task_defs(&self, defs: &[TaskDef]) -> Result<()> {
        let path = "metadata/taskdefs";
        let response = self
            .request(Method::POST, self.url(path))
            .await?
            .json(defs)
            .send()
            .await?;

        check_status(response, "POST", path).await?;
        Ok(())
    }

    async fn start_workflow(&self, request: &StartWorkflowRequest) -> Result<String> {
        let path = "workflow";
        let response = self
            .request(Method::POST, self.url(path))
            .await?
            .json(request)
            .send()
            .await?;

        let response = check_status(response, "POST", path).await?;
        let workflow_id = response.text().await?.trim().to_string();
        if workflow_id.is_empty() {
            return Err(HarnessError::Transport(format!(
                "POST {path} returned an empty workflow id for {}",
                request.name
            )));
        }
        Ok(workflow_id)
    }

    async fn get_workflow(&self, workflow_id: &str, include_tasks: bool) -> Result<Workflow> {
        let path = format!("workflow/{}", urlencoding::encode(workflow_id));
        let response = self
            .request(Method::GET, self.url(&path))
            .await?
            .query(&[("includeTasks", include_tasks)])
            .send()
            .await?;

        let response = check_status(response, "GET", &path).await?;
        Ok(response.json::<Workflow>().await?)
    }

    async fn health(&self) -> Result<HealthCheckStatus> {
        let response = self.client.get(self.health_url()).send().await?;
        let response = check_status(response, "GET", "health").await?;
        Ok(response.json::<HealthCheckStatus>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(base_url: &str) -> ServerConfig {
        ServerConfig {
            base_url: base_url.to_string(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_urls_respect_api_prefix() {
        let client = ConductorClient::new(&server("http://localhost:8080/api/")).unwrap();
        assert_eq!(client.url("workflow"), "http://localhost:8080/api/workflow");
        assert_eq!(client.health_url(), "http://localhost:8080/health");
    }

    #[test]
    fn test_half_configured_credentials_rejected() {
        let config = ServerConfig {
            key_id: Some("key".to_string()),
            ..server("http://localhost:8080/api")
        };
        assert!(matches!(
            ConductorClient::new(&config),
            Err(HarnessError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_no_token_without_credentials() {
        let client = ConductorClient::new(&server("http://localhost:8080/api")).unwrap();
        assert!(client.access_token().await.unwrap().is_none());
    }
}
