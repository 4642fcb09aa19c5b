use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Shuts down the OpenTelemetry tracer provider on drop so buffered spans are flushed.
pub struct TelemetryGuard {
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown tracer provider: {e}");
        }
    }
}

/// Initializes tracing with optional JSON formatting and optional OTLP export.
///
/// Configuration is driven by environment variables:
/// - `RUST_LOG` for filtering (defaults to `info`)
/// - `LOG_FORMAT=json` for flattened JSON lines
/// - `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export
///
/// Returns a guard that must be held for the lifetime of the application.
pub fn init_telemetry(service_name: &str) -> TelemetryGuard {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = Registry::default().with(env_filter).with(fmt_layer);

    match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok() {
        Some(endpoint) => {
            let (otel_layer, provider) = build_otel_layer(service_name, &endpoint);
            registry.with(otel_layer).init();
            TelemetryGuard {
                provider: Some(provider),
            }
        }
        None => {
            registry.init();
            TelemetryGuard { provider: None }
        }
    }
}

fn build_otel_layer<S>(
    service_name: &str,
    endpoint: &str,
) -> (
    tracing_opentelemetry::OpenTelemetryLayer<S, opentelemetry_sdk::trace::Tracer>,
    opentelemetry_sdk::trace::SdkTracerProvider,
)
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .expect("Failed to build OTLP span exporter");

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(service_name.to_owned())
                .build(),
        )
        .build();

    let tracer = provider.tracer(service_name.to_owned());
    opentelemetry::global::set_tracer_provider(provider.clone());

    let layer = tracing_opentelemetry::layer().with_tracer(tracer);
    (layer, provider)
}
