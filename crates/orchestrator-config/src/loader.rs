//! Loading from files and the environment.
//!
//! Order: defaults, then the file, then environment overrides, then
//! validation. Command-line flags are applied by the binary afterwards.

use orchestrator_core::{AgentEndpoint, ProtocolType};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{OracleProvider, OrchestratorConfig};
use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "ORCHESTRATOR_CONFIG";

const HOST_ENV: &str = "ORCHESTRATOR_HOST";
const PORT_ENV: &str = "ORCHESTRATOR_PORT";
const INTERVAL_ENV: &str = "ORCHESTRATOR_DISCOVERY_INTERVAL";
const LOG_LEVEL_ENV: &str = "ORCHESTRATOR_LOG_LEVEL";
const PROVIDER_ENV: &str = "ORCHESTRATOR_ORACLE_PROVIDER";
const ENDPOINTS_ENV: &str = "ORCHESTRATOR_ENDPOINTS";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";
const ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

impl OrchestratorConfig {
    /// Load the full configuration and validate it.
    ///
    /// `path` wins over `ORCHESTRATOR_CONFIG`; with neither, defaults are used.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, an environment
    /// value is malformed, or validation fails
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let config = Self::load_layers(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Merge defaults, the file and the environment without validating.
    ///
    /// Callers layering further overrides on top validate afterwards.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or an environment
    /// value is malformed
    pub fn load_layers(path: Option<&Path>) -> ConfigResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match &path {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, starting from defaults");
                Self::default()
            }
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;

        info!(
            config_file = ?path,
            endpoints = config.discovery.endpoints.len(),
            oracle = %config.oracle.provider,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Read a `.yaml`, `.yml` or `.toml` file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, parsed, or has another extension
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Apply environment overrides read through `lookup`
    ///
    /// # Errors
    /// Returns error if a variable holds an unparseable value
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(HOST_ENV) {
            self.server.host = host;
        }
        if let Some(port) = get(PORT_ENV) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::env(PORT_ENV, format!("{e}")))?;
        }
        if let Some(interval) = get(INTERVAL_ENV) {
            self.discovery.interval = parse_duration(&interval).map_err(|m| ConfigError::env(INTERVAL_ENV, m))?;
        }
        if let Some(level) = get(LOG_LEVEL_ENV) {
            self.telemetry.log_level = level.trim().to_ascii_lowercase();
        }
        if let Some(provider) = get(PROVIDER_ENV) {
            self.oracle.provider = provider
                .parse()
                .map_err(|m: String| ConfigError::env(PROVIDER_ENV, m))?;
        }
        if let Some(endpoints) = get(ENDPOINTS_ENV) {
            self.discovery.endpoints = parse_endpoints(&endpoints)?;
        }

        // Provider keys only fill an unset key for the matching provider
        if self.oracle.api_key.is_none() {
            let key_var = match self.oracle.provider {
                OracleProvider::OpenAi => Some(OPENAI_KEY_ENV),
                OracleProvider::Anthropic => Some(ANTHROPIC_KEY_ENV),
                OracleProvider::Keyword => None,
            };
            if let Some(key) = key_var.and_then(get) {
                self.oracle.api_key = Some(SecretString::new(key));
            }
        }
        Ok(())
    }
}

/// Humantime (`45s`, `2m`) or bare seconds
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

/// `protocol=url` pairs separated by commas
fn parse_endpoints(raw: &str) -> ConfigResult<Vec<AgentEndpoint>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (protocol, url) = item.split_once('=').ok_or_else(|| {
                ConfigError::env(ENDPOINTS_ENV, format!("expected protocol=url, got '{item}'"))
            })?;
            let protocol: ProtocolType = protocol
                .trim()
                .parse()
                .map_err(|e| ConfigError::env(ENDPOINTS_ENV, format!("{e}")))?;
            Ok(AgentEndpoint::new(protocol, url.trim()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_layers_defers_validation() {
        let file = write_temp(".toml", "[server]\nport = 0\n");

        let config = OrchestratorConfig::load_layers(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 0);
        assert!(OrchestratorConfig::load(Some(file.path())).is_err());
        config.with_port(8080).validate().unwrap();
    }

    #[test]
    fn test_yaml_file() {
        let file = write_temp(
            ".yaml",
            r"
server:
  port: 9000
discovery:
  interval: 1m
  eviction_window: 2h
  endpoints:
    - url: http://math-agent:8080
      protocol: a2a
      name: math
      capabilities: [arithmetic]
    - url: http://hello-agent:8000
      protocol: acp
routing:
  min_confidence: 0.5
resilience:
  base_delay: 500ms
",
        );
        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.discovery.interval, Duration::from_secs(60));
        assert_eq!(config.discovery.eviction_window, Duration::from_secs(7200));
        assert_eq!(config.discovery.endpoints.len(), 2);
        assert_eq!(config.discovery.endpoints[0].protocol, ProtocolType::A2a);
        assert_eq!(config.discovery.endpoints[0].capabilities, vec!["arithmetic"]);
        assert_eq!(config.resilience.base_delay, Duration::from_millis(500));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_file() {
        let file = write_temp(
            ".toml",
            r#"
[oracle]
provider = "openai"
api_key = "sk-test"
timeout = "15s"

[[discovery.endpoints]]
url = "http://files:9000"
protocol = "mcp"
"#,
        );
        let config = OrchestratorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.oracle.provider, OracleProvider::OpenAi);
        assert_eq!(config.oracle.api_key.as_ref().unwrap().expose_secret(), "sk-test");
        assert_eq!(config.oracle.timeout, Duration::from_secs(15));
        assert_eq!(config.oracle.model_name(), "gpt-4o");
        assert_eq!(config.discovery.endpoints[0].protocol, ProtocolType::Mcp);
    }

    #[test]
    fn test_unsupported_and_malformed_files() {
        let file = write_temp(".json", "{}");
        assert!(matches!(
            OrchestratorConfig::from_file(file.path()),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let file = write_temp(".yaml", "server: [not, a, map]");
        assert!(matches!(
            OrchestratorConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        assert!(matches!(
            OrchestratorConfig::from_file(Path::new("/nonexistent/orchestrator.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = OrchestratorConfig::default();
        config
            .apply_env_from(lookup(&[
                ("ORCHESTRATOR_HOST", "127.0.0.1"),
                ("ORCHESTRATOR_PORT", "8081"),
                ("ORCHESTRATOR_DISCOVERY_INTERVAL", "45"),
                ("ORCHESTRATOR_LOG_LEVEL", "DEBUG"),
                ("ORCHESTRATOR_ORACLE_PROVIDER", "anthropic"),
                ("ANTHROPIC_API_KEY", "sk-ant"),
                ("OPENAI_API_KEY", "sk-openai"),
                (
                    "ORCHESTRATOR_ENDPOINTS",
                    "a2a=http://math-agent:8080, acp=http://hello-agent:8000,",
                ),
            ]))
            .unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:8081");
        assert_eq!(config.discovery.interval, Duration::from_secs(45));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.oracle.provider, OracleProvider::Anthropic);
        assert_eq!(config.oracle.api_key.as_ref().unwrap().expose_secret(), "sk-ant");
        assert_eq!(config.discovery.endpoints.len(), 2);
        assert_eq!(config.discovery.endpoints[1].url, "http://hello-agent:8000");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_rejects_malformed_values() {
        let mut config = OrchestratorConfig::default();
        assert!(matches!(
            config.apply_env_from(lookup(&[("ORCHESTRATOR_PORT", "eighty")])),
            Err(ConfigError::Env { var, .. }) if var == "ORCHESTRATOR_PORT"
        ));
        assert!(config
            .apply_env_from(lookup(&[("ORCHESTRATOR_ENDPOINTS", "http://no-protocol")]))
            .is_err());
        assert!(config
            .apply_env_from(lookup(&[("ORCHESTRATOR_DISCOVERY_INTERVAL", "soon")]))
            .is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_duration("").is_err());
    }
}
