//! HTTP access to the remote task API.

use super::types::{TaskResponse, TaskStatus};
use crate::error::{Result, SandctlError};
use async_trait::async_trait;
use reqwest::{Client, Method, Request, Response};
use serde::Deserialize;
use tracing::debug;

/// Submit requests that schedule tasks and query task status
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Send a scheduling request and return the task id from its response
    async fn submit(&self, request: Request) -> Result<String>;

    /// Current status of a task
    async fn status(&self, task_id: &str) -> Result<TaskStatus>;
}

/// `TaskApi` over a configured reqwest client
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpTaskApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    /// Send basic auth with every request
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a request against `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<Request> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self.client.request(method, url);

        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn submit(&self, request: Request) -> Result<String> {
        debug!("Submitting {} {}", request.method(), request.url());
        let response = ensure_success(self.client.execute(request).await?).await?;
        let body = response.text().await?;

        let parsed: TaskResponse = serde_json::from_str(&body)
            .map_err(|e| SandctlError::parse(format!("invalid task response: {}", e)))?;

        match parsed.task_id {
            Some(id) if !id.is_empty() => {
                debug!("Remote scheduled task {}", id);
                Ok(id)
            }
            _ => Err(SandctlError::parse("response does not contain a task id")),
        }
    }

    async fn status(&self, task_id: &str) -> Result<TaskStatus> {
        let request = self.request(Method::GET, &format!("task/{}", task_id), None)?;
        let response = ensure_success(self.client.execute(request).await?).await?;
        let body = response.text().await?;

        serde_json::from_str(&body)
            .map_err(|e| SandctlError::parse(format!("invalid status for task {}: {}", task_id, e)))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a non-success response into `SandctlError::Remote`, preferring the
/// server's `message` field over the raw body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(error) => error.message,
        Err(_) if body.trim().is_empty() => status.canonical_reason().unwrap_or("unknown error").to_string(),
        Err(_) => body.trim().to_string(),
    };

    Err(SandctlError::remote(status.as_u16(), message))
}
