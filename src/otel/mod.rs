//! Logging and OpenTelemetry integration for release-gate
//!
//! Structured logs go to stdout through `tracing-subscriber`; when enabled,
//! spans and metrics are additionally exported to an OTLP endpoint.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as _,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider
///
/// Owns the tracer and meter providers; exporters are only installed when
/// OTLP export is enabled.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            (
                Some(Self::init_tracer_provider(endpoint, &resource)?),
                Self::init_meter_provider(endpoint, &resource)?,
            )
        } else {
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OTLP export is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush and shut down the providers
    pub fn shutdown(&self) -> Result<(), OtelError> {
        self.meter_provider
            .shutdown()
            .map_err(|e| OtelError::Shutdown(format!("Meter shutdown failed: {:?}", e)))?;

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                result.map_err(|e| OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)))?;
            }
        }

        Ok(())
    }
}

/// Proxy metrics
pub struct Metrics {
    /// Requests answered, by route and status
    pub requests_total: Counter<u64>,

    /// Rejected passwords
    pub auth_failures_total: Counter<u64>,

    /// Requests rejected because the client identity was blocked
    pub rate_limited_total: Counter<u64>,

    /// Upstream call duration in seconds, by operation
    pub upstream_duration: Histogram<f64>,
}

impl Metrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("release_gate_requests_total")
                .with_description("Total number of requests answered")
                .init(),
            auth_failures_total: meter
                .u64_counter("release_gate_auth_failures_total")
                .with_description("Total number of rejected passwords")
                .init(),
            rate_limited_total: meter
                .u64_counter("release_gate_rate_limited_total")
                .with_description("Total number of requests rejected by the rate limiter")
                .init(),
            upstream_duration: meter
                .f64_histogram("release_gate_upstream_duration_seconds")
                .with_description("Upstream request duration in seconds")
                .init(),
        }
    }

    /// Record an answered request
    pub fn record_request(&self, route: &'static str, status: u16) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("route", route),
                KeyValue::new("status", i64::from(status)),
            ],
        );
    }

    /// Record a rejected password
    pub fn record_auth_failure(&self) {
        self.auth_failures_total.add(1, &[]);
    }

    /// Record a rate-limited rejection
    pub fn record_rate_limited(&self) {
        self.rate_limited_total.add(1, &[]);
    }

    /// Record the duration of an upstream call
    pub fn record_upstream_duration(&self, operation: &'static str, duration_secs: f64) {
        self.upstream_duration
            .record(duration_secs, &[KeyValue::new("operation", operation)]);
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the global tracing subscriber
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter =
        tracing_subscriber::filter::LevelFilter::from_level(parse_level(&logging.level));

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer().pretty());
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("release-gate")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(pretty_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}
