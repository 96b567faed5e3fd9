//! Process-wide `tracing` setup.
//!
//! [`init_tracing`] installs one subscriber for the whole process.  Console
//! output always goes to stderr so a shell driving the bridge can keep stdout
//! for protocol responses.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | `EnvFilter` directives, `info` when unset. |
//! | `MANCON_LOG_FORMAT` | `json` for newline-delimited JSON, anything else for compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL; enables OTLP/HTTP span export. |
//!
//! ```rust,no_run
//! let _telemetry = mancon_runtime::telemetry::init_tracing("mancon");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";
const TRACER_NAME: &str = "mancon";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        Self::parse(std::env::var("MANCON_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber and, if configured, the OTLP exporter.
///
/// A second call leaves the first subscriber in place and only reports it.
/// Keep the returned guard alive until exit so buffered spans are flushed.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let exporter = otlp_provider(service_name);
    let spans = exporter
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME)));

    let (json, compact) = match LogFormat::from_env() {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json();
            (Some(layer), None)
        }
        LogFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact();
            (None, Some(layer))
        }
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(spans)
        .with(json)
        .with(compact)
        .try_init()
    {
        eprintln!("[mancon] keeping the existing tracing subscriber: {e}");
    }

    TracerProviderGuard(exporter)
}

/// Flushes and shuts down the span exporter when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    /// `true` when spans are being exported over OTLP.
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[mancon] span exporter did not shut down cleanly: {e}");
        }
    }
}

fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[mancon] OTLP export disabled: {e}");
            return None;
        }
    };

    // The bridge has no async runtime, so spans are exported inline.
    let provider = SdkTracerProvider::builder()
        .with_resource(Resource::builder().with_service_name(service_name.to_string()).build())
        .with_simple_exporter(exporter)
        .build();
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_is_case_insensitive_and_defaults_to_compact() {
        assert_eq!(LogFormat::parse(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" json ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(None), LogFormat::Compact);
    }

    #[test]
    fn no_exporter_without_endpoint() {
        // SAFETY: the only test in this crate touching this variable.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(otlp_provider("mancon-test").is_none());
    }

    #[test]
    fn empty_guard_reports_no_export_and_drops_quietly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }
}
