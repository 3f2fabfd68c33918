use std::time::Duration;

use color_eyre::{eyre::WrapErr, Result};
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};
use tracing_tree::HierarchicalLayer;

const DEFAULT_LOG_FILTER: &str = "warn,server=trace,db=debug,tower_http=debug";

/// Installs the global subscriber: env filter, indented stdout logging,
/// Sentry breadcrumbs and, when `OTEL_EXPORTER_OTLP_ENDPOINT` is set, an
/// OTLP trace exporter.
pub fn setup_tracing(service_name: &'static str) -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let env_filter = EnvFilter::builder()
        .parse(&rust_log)
        .wrap_err_with(|| format!("Couldn't create env filter from {rust_log}"))?;

    let opentelemetry_layer = if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .http()
                    .with_endpoint(endpoint)
                    .with_timeout(Duration::from_secs(3)),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::config()
                    .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name)])),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .wrap_err("Couldn't install the OTLP exporter")?;

        println!("OTLP layer configured");

        Some(OpenTelemetryLayer::new(tracer))
    } else {
        println!("Skipping OTLP layer");

        None
    };

    let heirarchical = HierarchicalLayer::default()
        .with_writer(std::io::stdout)
        .with_indent_lines(true)
        .with_indent_amount(2)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_verbose_exit(true)
        .with_verbose_entry(true)
        .with_targets(true);

    Registry::default()
        .with(heirarchical)
        .with(opentelemetry_layer)
        .with(sentry_tracing::layer())
        .with(env_filter)
        .try_init()
        .wrap_err("Couldn't install the tracing subscriber")?;

    Ok(())
}

/// Starts the Sentry client when `SENTRY_DSN` is set. Keep the guard alive
/// for the life of the process so queued events get flushed.
pub fn setup_sentry() -> Option<sentry::ClientInitGuard> {
    let Ok(raw_dsn) = std::env::var("SENTRY_DSN") else {
        println!("Sentry not configured in this environment");
        return None;
    };
    let dsn = match raw_dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => dsn,
        Err(e) => {
            eprintln!("Ignoring invalid SENTRY_DSN: {e}");
            return None;
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        traces_sample_rate: 0.5,
        ..Default::default()
    });
    println!("Sentry enabled");

    Some(guard)
}
