/*!
Logging and metrics setup for export runs.

Logging goes through `tracing`; the filter comes from `RUST_LOG` and defaults
to `logvault=info`. With the `metrics` feature, export counters and the poll
wait histogram are kept in a process-wide Prometheus registry.
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Duration;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{ExportError, Result};

/// Filter applied when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "logvault=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<ExportMetrics> = OnceLock::new();

/// Counters for export runs
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct ExportMetrics {
    pub exports_submitted_total: Counter,
    pub export_failures_total: Counter,
    pub status_polls_total: Counter,
    pub export_wait_seconds: Histogram,
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> ExportError {
    ExportError::config(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl ExportMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let exports_submitted_total = Counter::new(
            "logvault_exports_submitted_total",
            "Export tasks accepted by the log service",
        )
        .map_err(|e| metric_error("exports_submitted_total", e))?;

        let export_failures_total = Counter::new(
            "logvault_export_failures_total",
            "Sources whose export did not complete",
        )
        .map_err(|e| metric_error("export_failures_total", e))?;

        let status_polls_total = Counter::new(
            "logvault_status_polls_total",
            "Export task status reads",
        )
        .map_err(|e| metric_error("status_polls_total", e))?;

        // Poll sleeps double from 6s, so the buckets follow the same steps
        let export_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "logvault_export_wait_seconds",
                "Time spent waiting for an export task to finish",
            )
            .buckets(vec![6.0, 18.0, 42.0, 90.0, 186.0, 378.0, 762.0]),
        )
        .map_err(|e| metric_error("export_wait_seconds", e))?;

        registry
            .register(Box::new(exports_submitted_total.clone()))
            .map_err(|e| metric_error("exports_submitted_total", e))?;
        registry
            .register(Box::new(export_failures_total.clone()))
            .map_err(|e| metric_error("export_failures_total", e))?;
        registry
            .register(Box::new(status_polls_total.clone()))
            .map_err(|e| metric_error("status_polls_total", e))?;
        registry
            .register(Box::new(export_wait_seconds.clone()))
            .map_err(|e| metric_error("export_wait_seconds", e))?;

        Ok(Self {
            exports_submitted_total,
            export_failures_total,
            status_polls_total,
            export_wait_seconds,
            registry,
        })
    }

    /// Get or initialize the process-wide metrics
    pub fn global() -> &'static ExportMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize logvault metrics"))
    }

    pub fn record_submission(&self) {
        self.exports_submitted_total.inc();
    }

    pub fn record_failure(&self) {
        self.export_failures_total.inc();
    }

    pub fn record_poll(&self) {
        self.status_polls_total.inc();
    }

    pub fn record_wait(&self, waited: Duration) {
        self.export_wait_seconds.observe(waited.as_secs_f64());
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| ExportError::config(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| ExportError::config(format!("Metrics output is not UTF-8: {e}")))
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event, for log shippers
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global tracing subscriber.
///
/// # Errors
/// Fails if a global subscriber is already installed.
pub fn init_observability(format: LogFormat) -> Result<()> {
    #[cfg(feature = "metrics")]
    ExportMetrics::global();

    let installed = match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(true);
            set_global_default(TracingRegistry::default().with(env_filter()).with(layer))
        }
        LogFormat::Text => {
            let layer = tracing_subscriber::fmt::layer().with_target(false);
            set_global_default(TracingRegistry::default().with(env_filter()).with(layer))
        }
    };

    installed.map_err(|e| {
        ExportError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!(?format, "Observability initialized");
    Ok(())
}

/// JSON logs, which is what the scheduled invocation emits
pub fn init_default_observability() -> Result<()> {
    init_observability(LogFormat::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Other tests in this binary may have won the race; either way the
        // second call must report an error instead of panicking.
        let _ = init_observability(LogFormat::Text);
        let err = init_observability(LogFormat::Json).unwrap_err();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_are_gathered() {
        let metrics = ExportMetrics::global();
        metrics.record_submission();
        metrics.record_failure();
        metrics.record_poll();
        metrics.record_wait(Duration::from_secs(18));

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("logvault_exports_submitted_total"));
        assert!(text.contains("logvault_status_polls_total"));
        assert!(text.contains("logvault_export_wait_seconds_bucket"));
    }
}
