//! Configuration sections and defaults.

use orchestrator_core::AgentEndpoint;
use secrecy::SecretString;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Shortest allowed discovery interval
pub const MIN_DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// HTTP server
    pub server: ServerConfig,
    /// Discovery loop and endpoints
    pub discovery: DiscoverySettings,
    /// Routing decisions
    pub routing: RoutingSettings,
    /// Circuit breaking and retries
    pub resilience: ResilienceSettings,
    /// Capability oracle
    pub oracle: OracleSettings,
    /// Logging and tracing
    pub telemetry: TelemetrySettings,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes
    pub body_limit: usize,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Time allowed for in-flight requests at shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            body_limit: 1024 * 1024,
            request_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Discovery settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Time between refresh cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Timeout of one probe request
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Endpoints probed at once
    pub max_concurrency: usize,
    /// Missed refreshes before an agent may be evicted
    pub eviction_cycles: u32,
    /// Minimum unseen time before an agent may be evicted
    #[serde(with = "humantime_serde")]
    pub eviction_window: Duration,
    /// Endpoints to discover
    pub endpoints: Vec<AgentEndpoint>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            max_concurrency: 8,
            eviction_cycles: 3,
            eviction_window: Duration::from_secs(3600),
            endpoints: Vec::new(),
        }
    }
}

/// Routing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Deadline for requests without `timeout_seconds`
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Candidates scored below this are discarded
    pub min_confidence: f64,
    /// Alternatives kept behind the selected agent
    pub max_alternatives: usize,
    /// Try alternatives when the selected agent fails
    pub enable_fallback: bool,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            min_confidence: 0.3,
            max_alternatives: 3,
            enable_fallback: true,
        }
    }
}

/// Circuit breaker and retry settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Consecutive failures that open a breaker
    pub failure_threshold: u32,
    /// Time an open breaker waits before a probe
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff cap
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each backoff
    #[serde(with = "humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
        }
    }
}

/// Capability oracle backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    /// Deterministic keyword scorer
    #[default]
    Keyword,
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages
    Anthropic,
}

impl OracleProvider {
    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Whether the provider needs an API key
    #[must_use]
    pub fn is_llm(&self) -> bool {
        !matches!(self, Self::Keyword)
    }
}

impl FromStr for OracleProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" | "none" => Ok(Self::Keyword),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!("unknown oracle provider '{other}'")),
        }
    }
}

impl std::fmt::Display for OracleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Backend
    pub provider: OracleProvider,
    /// Model name; a provider default when unset
    pub model: Option<String>,
    /// API key, never logged
    pub api_key: Option<SecretString>,
    /// API base URL override
    pub base_url: Option<String>,
    /// Timeout of one oracle call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: u32,
    /// Use the keyword scorer when the LLM call fails
    pub fallback_to_keyword: bool,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            provider: OracleProvider::Keyword,
            model: None,
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(10),
            temperature: 0.0,
            max_tokens: 1024,
            fallback_to_keyword: true,
        }
    }
}

impl OracleSettings {
    /// Configured model or the provider's default
    #[must_use]
    pub fn model_name(&self) -> &str {
        if let Some(model) = self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            return model;
        }
        match self.provider {
            OracleProvider::OpenAi => "gpt-4o",
            OracleProvider::Anthropic => "claude-3-5-sonnet-20240620",
            OracleProvider::Keyword => "keyword",
        }
    }
}

/// Logging and tracing settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Default level when `RUST_LOG` is unset
    pub log_level: String,
    /// JSON log lines
    pub json_logs: bool,
    /// Install the OpenTelemetry layer
    pub otel_enabled: bool,
    /// OTLP collector endpoint
    pub otlp_endpoint: Option<String>,
    /// Service name on spans
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            otel_enabled: false,
            otlp_endpoint: None,
            service_name: "agent-orchestrator".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Set the bind host
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    /// Set the bind port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.telemetry.log_level = level.into();
        self
    }

    /// Toggle JSON logs
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.telemetry.json_logs = json;
        self
    }

    /// Append a discovery endpoint
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: AgentEndpoint) -> Self {
        self.discovery.endpoints.push(endpoint);
        self
    }

    /// Set the oracle provider and key
    #[must_use]
    pub fn with_oracle(mut self, provider: OracleProvider, api_key: Option<SecretString>) -> Self {
        self.oracle.provider = provider;
        self.oracle.api_key = api_key;
        self
    }

    /// Check ranges and cross-field constraints
    ///
    /// # Errors
    /// Returns the first violated constraint
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be non-zero"));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "must not be empty"));
        }

        if self.discovery.interval < MIN_DISCOVERY_INTERVAL {
            return Err(ConfigError::invalid(
                "discovery.interval",
                format!(
                    "must be at least {}s, got {:?}",
                    MIN_DISCOVERY_INTERVAL.as_secs(),
                    self.discovery.interval
                ),
            ));
        }
        if self.discovery.probe_timeout.is_zero() {
            return Err(ConfigError::invalid("discovery.probe_timeout", "must be non-zero"));
        }
        if self.discovery.max_concurrency == 0 {
            return Err(ConfigError::invalid("discovery.max_concurrency", "must be at least 1"));
        }
        if self.discovery.eviction_cycles == 0 {
            return Err(ConfigError::invalid("discovery.eviction_cycles", "must be at least 1"));
        }
        for (i, endpoint) in self.discovery.endpoints.iter().enumerate() {
            validate_endpoint_url(&endpoint.url)
                .map_err(|message| ConfigError::invalid(format!("discovery.endpoints[{i}].url"), message))?;
        }

        if self.routing.default_timeout.is_zero() {
            return Err(ConfigError::invalid("routing.default_timeout", "must be non-zero"));
        }
        if self.routing.default_timeout >= self.server.request_timeout {
            return Err(ConfigError::invalid(
                "routing.default_timeout",
                format!(
                    "must be below server.request_timeout ({:?})",
                    self.server.request_timeout
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.routing.min_confidence) {
            return Err(ConfigError::invalid(
                "routing.min_confidence",
                format!("must be within [0, 1], got {}", self.routing.min_confidence),
            ));
        }

        if self.resilience.failure_threshold == 0 {
            return Err(ConfigError::invalid("resilience.failure_threshold", "must be at least 1"));
        }
        if self.resilience.base_delay > self.resilience.max_delay {
            return Err(ConfigError::invalid(
                "resilience.base_delay",
                "must not exceed resilience.max_delay",
            ));
        }

        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(ConfigError::invalid("oracle.temperature", "must be within [0, 2]"));
        }
        if self.oracle.provider.is_llm() && self.oracle.api_key.is_none() {
            return Err(ConfigError::invalid(
                "oracle.api_key",
                format!("required for provider {}", self.oracle.provider),
            ));
        }
        if let Some(base_url) = &self.oracle.base_url {
            validate_endpoint_url(base_url)
                .map_err(|message| ConfigError::invalid("oracle.base_url", message))?;
        }

        Ok(())
    }
}

fn validate_endpoint_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("'{raw}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("unsupported scheme '{scheme}'")),
    }
    if url.host_str().is_none() {
        return Err(format!("'{raw}' has no host"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::ProtocolType;

    #[test]
    fn test_defaults_are_valid() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.discovery.interval, Duration::from_secs(30));
        assert!((config.routing.min_confidence - 0.3).abs() < f64::EPSILON);
        assert_eq!(config.resilience.failure_threshold, 5);
        assert_eq!(config.oracle.provider, OracleProvider::Keyword);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = OrchestratorConfig::default();
        config.discovery.interval = Duration::from_secs(5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "discovery.interval"));

        let config = OrchestratorConfig::default().with_port(0);
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.routing.min_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.resilience.failure_threshold = 0;
        assert!(config.validate().is_err());

        let config = OrchestratorConfig::default()
            .with_endpoint(AgentEndpoint::new(ProtocolType::A2a, "not a url"));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "discovery.endpoints[0].url"));

        let config = OrchestratorConfig::default().with_oracle(OracleProvider::OpenAi, None);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "oracle.api_key"));
    }

    #[test]
    fn test_routing_timeout_must_fit_request_timeout() {
        let mut config = OrchestratorConfig::default();
        config.routing.default_timeout = config.server.request_timeout;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "routing.default_timeout"));

        config.routing.default_timeout = Duration::from_secs(60);
        config.validate().unwrap();
    }

    #[test]
    fn test_llm_provider_with_key_is_valid() {
        let config = OrchestratorConfig::default()
            .with_oracle(OracleProvider::Anthropic, Some(SecretString::new("sk-test".into())));
        config.validate().unwrap();
        assert_eq!(config.oracle.model_name(), "claude-3-5-sonnet-20240620");
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let config = OrchestratorConfig::default()
            .with_oracle(OracleProvider::OpenAi, Some(SecretString::new("sk-very-secret".into())));
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<OracleProvider>().unwrap(), OracleProvider::OpenAi);
        assert_eq!("keyword".parse::<OracleProvider>().unwrap(), OracleProvider::Keyword);
        assert!("gemini".parse::<OracleProvider>().is_err());
    }
}
