//! OpenTelemetry integration for registry-mirror-gateway
//!
//! Traces and metrics are exported over OTLP when enabled. Logging always goes
//! through `tracing-subscriber`, as JSON by default or human-readable with
//! `logging.format: pretty`.

use crate::config::OtelConfig;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

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

/// Tracing and metrics providers with optional OTLP export
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create the providers described by `config`
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;
            (Some(tracer_provider), meter_provider)
        } else {
            // Instruments still work, nothing is exported
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

    /// Tracer from the OTLP provider, or a no-op tracer when disabled
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Meter for the gateway's instruments
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OpenTelemetry is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush and stop both providers
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Gateway metrics
pub struct Metrics {
    /// Requests handled, by upstream and outcome
    pub requests_total: Counter<u64>,

    /// Token exchanges performed, by upstream and token service status
    pub token_requests_total: Counter<u64>,

    /// Docker Hub blob redirects followed
    pub blob_redirects_total: Counter<u64>,

    /// Time to answer a request in seconds
    pub request_duration: Histogram<f64>,

    /// Time spent waiting on upstream in seconds
    pub upstream_duration: Histogram<f64>,
}

impl Metrics {
    /// Create the instruments on `meter`
    pub fn new(meter: &Meter) -> Self {
        let requests_total = meter
            .u64_counter("mirror_gateway_requests_total")
            .with_description("Total number of requests handled")
            .init();

        let token_requests_total = meter
            .u64_counter("mirror_gateway_token_requests_total")
            .with_description("Total number of token exchanges with upstream auth services")
            .init();

        let blob_redirects_total = meter
            .u64_counter("mirror_gateway_blob_redirects_total")
            .with_description("Total number of Docker Hub blob redirects followed")
            .init();

        let request_duration = meter
            .f64_histogram("mirror_gateway_request_duration_seconds")
            .with_description("Request processing duration in seconds")
            .init();

        let upstream_duration = meter
            .f64_histogram("mirror_gateway_upstream_duration_seconds")
            .with_description("Upstream request duration in seconds")
            .init();

        Self {
            requests_total,
            token_requests_total,
            blob_redirects_total,
            request_duration,
            upstream_duration,
        }
    }

    /// Instruments on the global meter provider
    ///
    /// Nothing is exported unless a global provider has been installed.
    pub fn global() -> Self {
        Self::new(&global::meter("registry-mirror-gateway"))
    }

    /// Record a handled request
    pub fn record_request(&self, upstream: &str, outcome: &str) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("upstream", upstream.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
    }

    /// Record a token exchange and the status the token service answered with
    pub fn record_token_request(&self, upstream: &str, status: u16) {
        self.token_requests_total.add(
            1,
            &[
                KeyValue::new("upstream", upstream.to_string()),
                KeyValue::new("status", i64::from(status)),
            ],
        );
    }

    /// Record a followed blob redirect
    pub fn record_blob_redirect(&self, upstream: &str) {
        self.blob_redirects_total
            .add(1, &[KeyValue::new("upstream", upstream.to_string())]);
    }

    /// Record request duration
    pub fn record_request_duration(&self, upstream: &str, duration_secs: f64) {
        self.request_duration.record(
            duration_secs,
            &[KeyValue::new("upstream", upstream.to_string())],
        );
    }

    /// Record upstream request duration
    pub fn record_upstream_duration(&self, upstream: &str, duration_secs: f64) {
        self.upstream_duration.record(
            duration_secs,
            &[KeyValue::new("upstream", upstream.to_string())],
        );
    }
}

/// Install the global tracing subscriber
///
/// `format` is `json` (default) or `pretty`. When OpenTelemetry is enabled,
/// spans are also exported over OTLP.
pub fn init_tracing(otel: &OtelProvider, log_level: &str, format: &str) -> Result<(), OtelError> {
    let filter = env_filter(log_level, std::env::var("RUST_LOG").ok().as_deref());

    let otel_layer = otel
        .is_enabled()
        .then(|| tracing_opentelemetry::layer().with_tracer(otel.tracer("registry-mirror-gateway")));

    let registry = tracing_subscriber::registry().with(filter).with(otel_layer);

    let result = if format.eq_ignore_ascii_case("pretty") {
        registry.with(tracing_subscriber::fmt::layer().pretty()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    };

    result.map_err(|e| OtelError::TracerInit(e.to_string()))
}

/// `RUST_LOG` directives when set, otherwise the configured level
fn env_filter(log_level: &str, directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(parse_level(log_level)).into())
        .parse_lossy(directives.unwrap_or(""))
}

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
