use opentelemetry::trace::TraceId;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// How log lines are rendered on stderr
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> Option<TraceId> {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context

    match tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
    {
        TraceId::INVALID => None,
        valid => Some(valid),
    }
}

/// Exporter for reconcile spans, if a collector is configured through OPENTELEMETRY_ENDPOINT_URL
#[cfg(feature = "telemetry")]
fn init_tracer_provider() -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};

    let otlp_endpoint = std::env::var("OPENTELEMETRY_ENDPOINT_URL").ok()?;
    let exporter = match SpanExporter::builder()
        .with_tonic()
        .with_endpoint(otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("traces are not exported, the OTLP exporter failed to start: {err}");
            return None;
        }
    };

    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(
                Resource::builder()
                    .with_service_name("keyvalue-operator")
                    .build(),
            )
            .build(),
    )
}

/// Install the global subscriber: `RUST_LOG` filtering (default `info`), logs in `format`,
/// and span export when built with the `telemetry` feature
pub fn init(format: LogFormat) {
    #[cfg(feature = "telemetry")]
    let telemetry = init_tracer_provider().map(|provider| {
        use opentelemetry::trace::TracerProvider;
        let tracer = provider.tracer("keyvalue-operator");
        // the global provider keeps the exporter alive
        opentelemetry::global::set_tracer_provider(provider);
        tracing_opentelemetry::layer().with_tracer(tracer)
    });
    #[cfg(not(feature = "telemetry"))]
    let telemetry: Option<
        tracing_opentelemetry::OpenTelemetryLayer<Registry, opentelemetry::trace::noop::NoopTracer>,
    > = None;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (compact, json) = match format {
        LogFormat::Compact => (Some(tracing_subscriber::fmt::layer().compact()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let collector = Registry::default()
        .with(telemetry)
        .with(compact)
        .with(json)
        .with(env_filter);

    if let Err(err) = tracing::subscriber::set_global_default(collector) {
        eprintln!("tracing subscriber was already installed: {err}");
    }
}
