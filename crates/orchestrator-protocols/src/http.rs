//! Shared HTTP transport.
//!
//! One pooled `reqwest` client is shared by every protocol client. Probes and
//! health checks use the configured probe timeout; executions use the
//! timeout the caller passes in.

use orchestrator_core::{Agent, OrchestratorError, OrchestratorResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

/// Longest error body echoed back into an error message
const MAX_ERROR_BODY: usize = 512;

/// HTTP transport configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Timeout for discovery probes and health checks
    pub probe_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// User agent header
    pub user_agent: String,
    /// Largest agent response body read into memory
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
            pool_max_idle_per_host: 32,
            user_agent: concat!("agent-orchestrator/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl HttpConfig {
    /// Set the probe timeout
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the response body limit
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

/// Status and body of an HTTP response
#[derive(Debug, Clone)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// Raw body
    pub body: Vec<u8>,
}

impl HttpReply {
    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    ///
    /// # Errors
    /// Returns a protocol error if the body is not the expected JSON
    pub fn json<T: DeserializeOwned>(&self) -> OrchestratorResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| OrchestratorError::protocol(format!("invalid JSON body: {e}")))
    }

    /// Body as lossy UTF-8, truncated for error messages
    #[must_use]
    pub fn body_snippet(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if text.len() <= MAX_ERROR_BODY {
            return text.to_string();
        }
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }

    /// Turn a non-2xx reply from an agent into an error
    ///
    /// # Errors
    /// Returns an agent error carrying the status when the reply is not 2xx
    pub fn ensure_success(self, agent: &Agent) -> OrchestratorResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(OrchestratorError::agent_http(
            &agent.agent_id,
            self.status,
            format!("HTTP {}: {}", self.status, self.body_snippet()),
        ))
    }
}

/// Pooled HTTP transport shared by the protocol clients
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new transport
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: HttpConfig) -> OrchestratorResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| OrchestratorError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a transport with default configuration
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn with_defaults() -> OrchestratorResult<Self> {
        Self::new(HttpConfig::default())
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Probe timeout
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        self.config.probe_timeout
    }

    /// GET a URL within the probe timeout
    ///
    /// # Errors
    /// Returns a transport or timeout error if no response arrives
    pub async fn get(&self, url: &str) -> OrchestratorResult<HttpReply> {
        let timeout = self.config.probe_timeout;
        trace!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;
        read_reply(response, timeout, self.config.max_body_bytes).await
    }

    /// POST a JSON body within `timeout`
    ///
    /// # Errors
    /// Returns a transport or timeout error if no response arrives
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
    ) -> OrchestratorResult<HttpReply> {
        trace!(url = %url, timeout_ms = timeout.as_millis() as u64, "POST");
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e, timeout))?;
        read_reply(response, timeout, self.config.max_body_bytes).await
    }
}

/// Read the body chunk by chunk, failing once it passes `limit` bytes
async fn read_reply(mut response: reqwest::Response, timeout: Duration, limit: usize) -> OrchestratorResult<HttpReply> {
    let status = response.status().as_u16();
    let too_large = || OrchestratorError::protocol(format!("response body exceeds {limit} bytes"));

    let declared = response.content_length().and_then(|len| usize::try_from(len).ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    let mut body = Vec::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| map_reqwest_error(&e, timeout))?
    {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(HttpReply { status, body })
}

/// Map a reqwest failure onto the orchestrator taxonomy
#[must_use]
pub fn map_reqwest_error(err: &reqwest::Error, timeout: Duration) -> OrchestratorError {
    if err.is_timeout() {
        OrchestratorError::timeout(timeout)
    } else if err.is_builder() {
        OrchestratorError::invalid_request(format!("invalid request: {err}"))
    } else {
        OrchestratorError::transport(err.to_string())
    }
}

/// Join a base URL and a path with exactly one slash
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
