//! Tracing subscriber setup.
//!
//! Installs an `EnvFilter`, a fmt layer (pretty or JSON) and, when enabled,
//! an OpenTelemetry layer. `RUST_LOG` takes precedence over the configured
//! level.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::{
    trace::{Config, RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name reported on spans
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Default log level when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
    /// Install the OpenTelemetry layer
    pub otel_enabled: bool,
    /// OTLP collector endpoint, used with the `otlp` feature
    pub otlp_endpoint: Option<String>,
    /// Sampling rate (0.0 - 1.0)
    pub sampling_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "agent-orchestrator".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            otel_enabled: false,
            otlp_endpoint: None,
            sampling_rate: 1.0,
        }
    }
}

impl TracingConfig {
    /// Create a configuration for a service
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Toggle JSON output
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Toggle the OpenTelemetry layer
    #[must_use]
    pub fn with_otel(mut self, enabled: bool) -> Self {
        self.otel_enabled = enabled;
        self
    }

    /// Set the OTLP endpoint
    #[must_use]
    pub fn with_otlp_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Set the sampling rate
    #[must_use]
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn sampler(&self) -> Sampler {
        if self.sampling_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_rate)
        }
    }

    fn trace_config(&self) -> Config {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.version", self.service_version.clone()),
        ]);
        Config::default()
            .with_sampler(self.sampler())
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
    }
}

/// Initialize the global subscriber.
///
/// Returns the tracer provider when OpenTelemetry is enabled; pass it to
/// [`shutdown_tracing`] at exit.
///
/// # Errors
/// Returns error if a global subscriber is already installed or the exporter
/// cannot be built
pub fn init_tracing(config: &TracingConfig) -> Result<Option<TracerProvider>, TracingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.json_logs {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_line_number(true).boxed()
    };

    let provider = if config.otel_enabled {
        Some(build_provider(config)?)
    } else {
        None
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TracingError::Init(e.to_string()))?;

    info!(
        service = %config.service_name,
        version = %config.service_version,
        json = config.json_logs,
        otel = config.otel_enabled,
        "Tracing initialized"
    );
    Ok(provider)
}

#[cfg(not(feature = "otlp"))]
fn build_provider(config: &TracingConfig) -> Result<TracerProvider, TracingError> {
    if config.otlp_endpoint.is_some() {
        warn!("OTLP endpoint configured but the otlp feature is disabled; spans stay in-process");
    }
    Ok(TracerProvider::builder()
        .with_config(config.trace_config())
        .build())
}

#[cfg(feature = "otlp")]
fn build_provider(config: &TracingConfig) -> Result<TracerProvider, TracingError> {
    use opentelemetry_otlp::WithExportConfig;

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        warn!("OpenTelemetry enabled without an OTLP endpoint; spans stay in-process");
        return Ok(TracerProvider::builder()
            .with_config(config.trace_config())
            .build());
    };

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(config.trace_config())
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .map_err(|e| TracingError::OtlpConfig(e.to_string()))
}

/// Flush remaining spans
pub fn shutdown_tracing(provider: Option<TracerProvider>) {
    if let Some(provider) = provider {
        for result in provider.force_flush() {
            if let Err(e) = result {
                warn!(error = %e, "Failed to flush spans");
            }
        }
        drop(provider);
        info!("Tracing shutdown complete");
    }
}

/// Tracing initialization error
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    /// Failed to install the subscriber
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
    /// OTLP exporter could not be built
    #[error("OTLP configuration error: {0}")]
    OtlpConfig(String),
}
