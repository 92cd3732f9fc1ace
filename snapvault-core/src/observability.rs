/*!
Observability infrastructure for Snapvault.

This module provides:
- Structured logging setup (JSON or human-readable) through `tracing-subscriber`
- Prometheus metrics for export, restore, purge and scheduled runs (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SnapvaultError};

/// Filter applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "snapvault=info,snapvault_core=info";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<SnapvaultMetrics>> = OnceLock::new();

/// Metrics collection for Snapvault operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SnapvaultMetrics {
    pub exports_total: Counter,
    pub export_failures_total: Counter,
    pub export_duration_seconds: Histogram,
    pub artifact_size_bytes: Histogram,
    pub restores_total: Counter,
    pub purges_total: Counter,
    pub scheduled_runs_total: Counter,
    pub scheduled_failures_total: Counter,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn metric_error(name: &str, e: prometheus::Error) -> SnapvaultError {
    SnapvaultError::storage(format!("Failed to set up metric {name}: {e}"))
}

#[cfg(feature = "metrics")]
impl SnapvaultMetrics {
    /// Initialize a new metrics instance with its own registry
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<Counter> {
            let counter = Counter::new(name, help).map_err(|e| metric_error(name, e))?;
            registry
                .register(Box::new(counter.clone()))
                .map_err(|e| metric_error(name, e))?;
            Ok(counter)
        };
        let histogram = |name: &str, help: &str, buckets: Vec<f64>| -> Result<Histogram> {
            let histogram =
                Histogram::with_opts(prometheus::HistogramOpts::new(name, help).buckets(buckets))
                    .map_err(|e| metric_error(name, e))?;
            registry
                .register(Box::new(histogram.clone()))
                .map_err(|e| metric_error(name, e))?;
            Ok(histogram)
        };

        Ok(Self {
            exports_total: counter("snapvault_exports_total", "Snapshot exports written")?,
            export_failures_total: counter(
                "snapvault_export_failures_total",
                "Snapshot exports that failed",
            )?,
            export_duration_seconds: histogram(
                "snapvault_export_duration_seconds",
                "Duration of snapshot exports in seconds",
                prometheus::DEFAULT_BUCKETS.to_vec(),
            )?,
            artifact_size_bytes: histogram(
                "snapvault_artifact_size_bytes",
                "Size of written snapshot artifacts in bytes",
                prometheus::exponential_buckets(1024.0, 4.0, 10)
                    .map_err(|e| metric_error("snapvault_artifact_size_bytes", e))?,
            )?,
            restores_total: counter("snapvault_restores_total", "Completed restores")?,
            purges_total: counter("snapvault_purges_total", "Completed purges")?,
            scheduled_runs_total: counter(
                "snapvault_scheduled_runs_total",
                "Scheduled export runs started",
            )?,
            scheduled_failures_total: counter(
                "snapvault_scheduled_failures_total",
                "Scheduled export runs that failed",
            )?,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// Returns `None` when the registry could not be built; metrics are then
    /// silently skipped rather than failing the operation being measured.
    pub fn global() -> Option<&'static SnapvaultMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::warn!(error = %e, "metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SnapvaultError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            SnapvaultError::storage(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Run `f` against the global metrics, if they are available
#[cfg(feature = "metrics")]
pub fn with_metrics<F: FnOnce(&SnapvaultMetrics)>(f: F) {
    if let Some(metrics) = SnapvaultMetrics::global() {
        f(metrics);
    }
}

/// Timer for a single export
#[cfg(feature = "metrics")]
pub struct ExportTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl ExportTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record a successful export of `artifact_bytes`
    pub fn finish(self, artifact_bytes: usize) {
        let elapsed = self.start.elapsed();
        with_metrics(|m| {
            m.exports_total.inc();
            m.export_duration_seconds.observe(elapsed.as_secs_f64());
            m.artifact_size_bytes.observe(artifact_bytes as f64);
        });
    }

    pub fn finish_with_error(self) {
        let elapsed = self.start.elapsed();
        with_metrics(|m| {
            m.export_failures_total.inc();
            m.export_duration_seconds.observe(elapsed.as_secs_f64());
        });
    }
}

/// Initialize the global logging system
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`] when set.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    SnapvaultMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        SnapvaultError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Snapvault observability initialized");
    Ok(())
}

/// Initialize observability with JSON output
pub fn init_default_observability() -> Result<()> {
    init_observability(true)
}
