use std::time::Duration;

use reqwest::Client;
use serde_json::json;

use crate::backend::VideoBackend;
use crate::error::{GenerationError, Result};
use crate::types::{JobHandle, JobStatus, SubmitRequest, VideoTask};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(15);

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Video generation backend reached over HTTP.
///
/// Posts jobs to `{endpoint}/generate` and polls `{endpoint}/status`. The
/// endpoint is normally the studio's own proxy, which attaches provider
/// credentials server-side.
///
/// # Example
/// ```no_run
/// use studio_jobs::{HttpVideoBackend, VideoTaskRunner, VideoTask};
///
/// # async fn example() -> studio_jobs::Result<()> {
/// let backend = HttpVideoBackend::new("https://studio.example.com/api/video");
/// let runner = VideoTaskRunner::new(backend);
/// let url = runner
///     .generate_one(&VideoTask::from_image("look-1", "https://img.example.com/1.png", "slow pan"))
///     .await?;
/// println!("{url}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpVideoBackend {
    http: Client,
    endpoint: String,
}

impl HttpVideoBackend {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        timeout: Duration,
        context: &str,
    ) -> Result<(u16, String)> {
        let url = format!("{}/{}", self.endpoint, path);
        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| GenerationError::Network {
                context: format!("{} at {}", context, self.endpoint),
                source: e,
            })?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| GenerationError::Network {
            context: format!("Failed to read {} response", path),
            source: e,
        })?;
        Ok((status, text))
    }
}

impl VideoBackend for HttpVideoBackend {
    async fn submit(&self, task: &VideoTask) -> Result<JobHandle> {
        let body = serde_json::to_value(SubmitRequest::from(task))?;
        let (status, text) = self
            .post_json("generate", &body, SUBMIT_TIMEOUT, "Cannot submit video job")
            .await?;
        JobHandle::from_submit_reply(status, &text)
    }

    async fn status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let body = json!({ "id": handle.as_str() });
        let (status, text) = self
            .post_json("status", &body, STATUS_TIMEOUT, "Cannot query video job status")
            .await?;
        JobStatus::from_reply(status, &text)
    }
}
