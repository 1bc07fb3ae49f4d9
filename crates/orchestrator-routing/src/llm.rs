//! LLM-backed capability oracle.
//!
//! Sends the query and the structured agent profiles (schemas included) to a
//! chat model and asks for a JSON ranking back. Identifiers the model invents
//! are dropped; confidences are clamped.

use async_trait::async_trait;
use orchestrator_core::{OrchestratorError, OrchestratorResult};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

use crate::oracle::{AgentProfile, CapabilityOracle, OracleRanking, RankedCandidate};

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You route user requests to software agents. \
You are given a user query and a JSON list of available agents with their capabilities \
and input/output schemas. Rank the agents that can handle the query, best first. \
Respond with a single JSON object and nothing else, in the form \
{\"rankings\": [{\"agent_id\": \"...\", \"confidence\": 0.0}], \"reasoning\": \"...\"}. \
Confidence is between 0 and 1. Only use agent_id values from the list. \
Omit agents that cannot handle the query.";

/// Chat model vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages
    Anthropic,
}

impl LlmProvider {
    /// Lowercase provider name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Anthropic => "https://api.anthropic.com",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM oracle settings
#[derive(Debug, Clone)]
pub struct LlmOracleConfig {
    /// Vendor
    pub provider: LlmProvider,
    /// API key
    pub api_key: SecretString,
    /// Model name
    pub model: String,
    /// API base URL; the vendor default when `None`
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
}

impl LlmOracleConfig {
    /// Create a config with default sampling settings
    pub fn new(provider: LlmProvider, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            provider,
            api_key,
            model: model.into(),
            base_url: None,
            timeout: Duration::from_secs(10),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token limit
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }
}

/// Oracle that asks a chat model to rank agents
pub struct LlmOracle {
    config: LlmOracleConfig,
    client: Client,
}

impl LlmOracle {
    /// Create an LLM oracle
    ///
    /// # Errors
    /// Returns error if the API key or model is empty, or the HTTP client cannot be built
    pub fn new(config: LlmOracleConfig) -> OrchestratorResult<Self> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(OrchestratorError::configuration(format!(
                "API key is required for the {} oracle",
                config.provider
            )));
        }
        if config.model.trim().is_empty() {
            return Err(OrchestratorError::configuration("oracle model must not be empty"));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| OrchestratorError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &LlmOracleConfig {
        &self.config
    }

    fn user_prompt(query: &str, context: Option<&Value>, agents: &[AgentProfile]) -> OrchestratorResult<String> {
        let agents = serde_json::to_string_pretty(agents)
            .map_err(|e| OrchestratorError::oracle(format!("Failed to encode agents: {e}")))?;
        let mut prompt = format!("User Query: {query}\n");
        if let Some(context) = context {
            prompt.push_str(&format!("Context: {context}\n"));
        }
        prompt.push_str(&format!("\nAvailable Agents:\n{agents}\n"));
        Ok(prompt)
    }

    fn openai_request(&self, prompt: &str) -> (String, Value) {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": {"type": "json_object"},
        });
        (url, body)
    }

    fn anthropic_request(&self, prompt: &str) -> (String, Value) {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = json!({
            "model": self.config.model,
            "system": SYSTEM_PROMPT,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        (url, body)
    }

    /// Send the prompt and return the model's text
    async fn complete(&self, prompt: &str) -> OrchestratorResult<String> {
        let provider = self.config.provider;
        let (url, body) = match provider {
            LlmProvider::OpenAi => self.openai_request(prompt),
            LlmProvider::Anthropic => self.anthropic_request(prompt),
        };

        debug!(provider = %provider, model = %self.config.model, url = %url, "Sending oracle request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        request = match provider {
            LlmProvider::OpenAi => request.bearer_auth(self.config.api_key.expose_secret()),
            LlmProvider::Anthropic => request
                .header("x-api-key", self.config.api_key.expose_secret())
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let response = request.json(&body).send().await.map_err(|e| {
            error!(provider = %provider, error = %e, "Oracle request failed");
            OrchestratorError::oracle(format!("{provider} request failed: {e}"))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| OrchestratorError::oracle(format!("Failed to read {provider} response: {e}")))?;

        trace!(status = %status, body = %text, "Received oracle response");

        if !status.is_success() {
            return Err(OrchestratorError::oracle(format!("{provider} returned HTTP {status}: {text}")));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| OrchestratorError::oracle(format!("Invalid {provider} response JSON: {e}")))?;
        let content = match provider {
            LlmProvider::OpenAi => value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str),
            LlmProvider::Anthropic => value
                .get("content")
                .and_then(Value::as_array)
                .and_then(|blocks| {
                    blocks
                        .iter()
                        .find(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                })
                .and_then(|b| b.get("text"))
                .and_then(Value::as_str),
        };
        content
            .map(str::to_string)
            .ok_or_else(|| OrchestratorError::oracle(format!("{provider} response has no text content")))
    }
}

impl fmt::Debug for LlmOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmOracle")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RankingReply {
    #[serde(default)]
    rankings: Vec<RankingEntry>,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RankingEntry {
    agent_id: String,
    #[serde(default)]
    confidence: f64,
}

/// Parse the model's reply, keeping only known agents
fn parse_ranking(text: &str, agents: &[AgentProfile]) -> OrchestratorResult<OracleRanking> {
    // Models sometimes wrap the object in prose or code fences
    let start = text.find('{');
    let end = text.rfind('}');
    let json_text = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => return Err(OrchestratorError::oracle("oracle reply contains no JSON object")),
    };
    let reply: RankingReply = serde_json::from_str(json_text)
        .map_err(|e| OrchestratorError::oracle(format!("Malformed oracle reply: {e}")))?;

    let known: HashSet<&str> = agents.iter().map(|a| a.agent_id.as_str()).collect();
    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(reply.rankings.len());
    for entry in reply.rankings {
        if !known.contains(entry.agent_id.as_str()) {
            warn!(agent_id = %entry.agent_id, "Oracle ranked an unknown agent, ignoring");
            continue;
        }
        if seen.insert(entry.agent_id.clone()) {
            candidates.push(RankedCandidate::new(entry.agent_id, entry.confidence));
        }
    }

    Ok(OracleRanking {
        candidates,
        reasoning: reply.reasoning,
    })
}

#[async_trait]
impl CapabilityOracle for LlmOracle {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    async fn rank(
        &self,
        query: &str,
        context: Option<&Value>,
        agents: &[AgentProfile],
    ) -> OrchestratorResult<OracleRanking> {
        if agents.is_empty() {
            return Ok(OracleRanking::default());
        }
        let prompt = Self::user_prompt(query, context, agents)?;
        let text = self.complete(&prompt).await?;
        parse_ranking(&text, agents)
    }
}
