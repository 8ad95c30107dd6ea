use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants::DEFAULT_LOG_FILTER;
use crate::util::env::{Env, LogFormat};

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

/// Owns the tracing setup for the process.
///
/// Console output is always on. When an OTLP collector endpoint is configured, spans and log
/// records are also exported over gRPC; the providers have to be flushed through
/// [`Telemetry::shutdown`] before exit or buffered records are lost.
#[derive(Debug)]
pub struct Telemetry {
    pub service_name: String,
    pub format: LogFormat,

    exporters: Option<Exporters>,
}

#[derive(Debug)]
struct Exporters {
    logger_provider: SdkLoggerProvider,
    tracer_provider: SdkTracerProvider,
}

impl Telemetry {
    pub fn new(env: &Env) -> Result<Telemetry> {
        let service_name = env.otel_service_name.clone();
        let exporters = match env.otel_endpoint() {
            Some(collector_url) => {
                let base_resource = base_attrs(&service_name, env!("CARGO_PKG_VERSION"));
                Some(Exporters {
                    logger_provider: build_logger_provider(collector_url, base_resource.clone())?,
                    tracer_provider: build_tracer_provider(collector_url, base_resource)?,
                })
            }
            None => None,
        };

        Ok(Self {
            service_name,
            format: env.log_format,
            exporters,
        })
    }

    pub fn register(self) -> Self {
        let (trace_layer, log_layer) = match &self.exporters {
            Some(exporters) => {
                global::set_tracer_provider(exporters.tracer_provider.clone());
                let tracer = global::tracer(self.service_name.clone());

                (
                    Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                    Some(OpenTelemetryTracingBridge::new(&exporters.logger_provider)),
                )
            }
            None => (None, None),
        };

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let json = self.format == LogFormat::Json;

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(filter)
            .with(json.then(|| fmt::layer().json().with_current_span(true)))
            .with((!json).then(|| {
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
            }))
            .init();

        tracing::debug!(
            service_name = self.service_name,
            otlp_export = self.exporters.is_some(),
            "telemetry registered"
        );

        self
    }

    pub fn shutdown(self) {
        let Some(exporters) = self.exporters else {
            return;
        };

        if let Err(e) = exporters.logger_provider.shutdown() {
            eprintln!("error during logging shutdown: {e:?}");
        }

        if let Err(e) = exporters.tracer_provider.shutdown() {
            eprintln!("error during tracing shutdown: {e:?}");
        }
    }
}

pub fn build_logger_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkLoggerProvider> {
    let exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Logs.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

pub fn build_tracer_provider(
    collector_url: &str,
    base_resource: Resource,
) -> Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_protocol(Protocol::Grpc)
        .with_endpoint(Endpoint::Traces.to_url(collector_url))
        .with_timeout(Duration::from_secs(5))
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(base_resource)
        .build())
}

fn base_attrs(name: &str, version: &'static str) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", name.to_string()),
            KeyValue::new("service.version", version),
        ])
        .build()
}

enum Endpoint {
    Logs,
    Traces,
}

impl Endpoint {
    pub fn to_url(&self, collector_endpoint: &str) -> String {
        let location = match self {
            Endpoint::Logs => "/v1/logs",
            Endpoint::Traces => "/v1/traces",
        };

        format!("{}{location}", collector_endpoint.trim_end_matches('/'))
    }
}
