//! Telemetry logic.
//! Logs go to stderr and, when an endpoint is set, to an OTLP collector.
//! Metrics are kept by a Prometheus recorder.
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

fn ressources() -> Resource {
    Resource::builder()
        .with_service_name(env!("CARGO_PKG_NAME"))
        .build()
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    metrics::describe_counter!(
        "ldap_login_total",
        "Directory login attempts by result."
    );
    metrics::describe_counter!(
        "ldap_dial_failures_total",
        "Directory hosts that could not be reached."
    );

    PrometheusBuilder::new().install_recorder()
}

/// Create OLTP exporter for logs.
pub fn setup_logging(endpoint: &str) -> Result<SdkLoggerProvider, BoxError> {
    let exporter = LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkLoggerProvider::builder()
        .with_resource(ressources())
        .with_batch_exporter(exporter)
        .build())
}

/// Install the global subscriber.
///
/// The returned provider must be kept, then shut down, to flush OTLP logs.
pub fn init(otlp_endpoint: Option<&str>) -> Result<Option<SdkLoggerProvider>, BoxError> {
    let provider = otlp_endpoint.map(setup_logging).transpose()?;
    let bridge = provider
        .as_ref()
        .map(|provider| OpenTelemetryTracingBridge::new(provider));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(bridge)
        .try_init()?;

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ressources_name() {
        let resource = ressources();
        let name = resource
            .iter()
            .find(|(key, _)| key.as_str() == "service.name")
            .map(|(_, value)| value.to_string());

        assert_eq!(name.as_deref(), Some("autha-directory"));
    }
}
