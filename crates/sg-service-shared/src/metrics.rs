//! Prometheus metrics infrastructure for the SG service.
//!
//! This module provides:
//! - [`init_metrics`]: Initialize the Prometheus metrics recorder
//! - [`metrics_handler`]: Axum handler for `/metrics` endpoint
//! - Recording helpers used by the instrumentation middleware
//!
//! # Series
//!
//! | Name | Kind | Labels | Buckets |
//! |---|---|---|---|
//! | `sg_http_calls` | counter | `handler`, `code` | - |
//! | `sg_http_latency` | histogram (seconds) | `handler`, `code` | 0.25 .. 10 |
//! | `sg_response_size_bytes` | histogram (bytes) | none | 200 .. 1500 |
//!
//! # Example
//!
//! ```no_run
//! use sg_service_shared::metrics::{init_metrics, metrics_handler};
//! use axum::{Router, routing::any};
//!
//! // Initialize metrics at startup
//! init_metrics().expect("failed to initialize metrics");
//!
//! // Add metrics endpoint to router
//! let app: Router = Router::new()
//!     .route("/metrics", any(metrics_handler));
//! ```

use std::time::Duration;

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Counter of handled calls, by route and status code.
pub const HTTP_CALLS: &str = "sg_http_calls";
/// Latency histogram in seconds, by route and status code.
pub const HTTP_LATENCY: &str = "sg_http_latency";
/// Response size histogram in bytes.
pub const RESPONSE_SIZE: &str = "sg_response_size_bytes";

/// Bucket boundaries for [`HTTP_LATENCY`].
pub const LATENCY_BUCKETS: [f64; 6] = [0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
/// Bucket boundaries for [`RESPONSE_SIZE`].
pub const RESPONSE_SIZE_BUCKETS: [f64; 4] = [200.0, 500.0, 900.0, 1500.0];

/// Body served by `/metrics` while no recorder is installed.
pub const METRICS_UNAVAILABLE: &str = "# Metrics not initialized\n";

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Build a Prometheus exporter with the bucket layout of the three series.
pub fn prometheus_builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(HTTP_LATENCY.to_string()), &LATENCY_BUCKETS)
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(RESPONSE_SIZE.to_string()),
            &RESPONSE_SIZE_BUCKETS,
        )
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))
}

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at application startup before any metrics are recorded.
/// Subsequent calls will return an error.
///
/// # Errors
///
/// Returns an error if:
/// - The recorder has already been installed
/// - The Prometheus builder fails to install
pub fn init_metrics() -> Result<(), MetricsError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = prometheus_builder()?
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    describe_series();
    Ok(())
}

fn describe_series() {
    metrics::describe_counter!(HTTP_CALLS, "A counter for the total number of http calls");
    metrics::describe_histogram!(
        HTTP_LATENCY,
        metrics::Unit::Seconds,
        "A histogram of latencies for requests."
    );
    metrics::describe_histogram!(
        RESPONSE_SIZE,
        metrics::Unit::Bytes,
        "A histogram of response sizes for requests."
    );
}

/// Axum handler for the `/metrics` endpoint.
///
/// Returns Prometheus exposition format text.
pub async fn metrics_handler() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| METRICS_UNAVAILABLE.to_string())
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, Clone, Error)]
pub enum MetricsError {
    /// The recorder has already been installed.
    #[error("metrics recorder already initialized")]
    AlreadyInitialized,
    /// The Prometheus builder failed to install.
    #[error("failed to install metrics recorder: {0}")]
    InstallFailed(String),
}

// =============================================================================
// Recording helpers
// =============================================================================

/// Record one completed call to `route`.
///
/// Increments `sg_http_calls` and observes `sg_http_latency`, both labeled
/// with the route name and numeric status code.
pub fn record_http_call(route: &'static str, status: u16, elapsed: Duration) {
    let code = status.to_string();

    metrics::counter!(HTTP_CALLS, "handler" => route, "code" => code.clone()).increment(1);

    metrics::histogram!(HTTP_LATENCY, "handler" => route, "code" => code)
        .record(elapsed.as_secs_f64());
}

/// Record the number of body bytes written for one response.
pub fn record_response_size(bytes: u64) {
    metrics::histogram!(RESPONSE_SIZE).record(bytes as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    type Snapshot = Vec<(String, Vec<(String, String)>, MetricKind, DebugValue)>;

    fn capture(f: impl FnOnce()) -> Snapshot {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        metrics::with_local_recorder(&recorder, f);

        snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| {
                let (kind, key) = key.into_parts();
                let labels = key
                    .labels()
                    .map(|l| (l.key().to_string(), l.value().to_string()))
                    .collect();
                (key.name().to_string(), labels, kind, value)
            })
            .collect()
    }

    fn labels(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_metrics_handler_without_recorder() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let output = rt.block_on(async { metrics_handler().await });

        // Unit tests only use local recorders, so the global one is never installed.
        assert_eq!(output, "# Metrics not initialized\n");
    }

    #[test]
    fn test_record_http_call_observes_each_series_once() {
        let snapshot = capture(|| record_http_call("/version", 200, Duration::from_millis(5)));

        assert_eq!(snapshot.len(), 2);
        let expected = labels(&[("handler", "/version"), ("code", "200")]);

        let counter = snapshot
            .iter()
            .find(|(name, ..)| name == HTTP_CALLS)
            .expect("counter recorded");
        assert_eq!(counter.1, expected);
        assert_eq!(counter.2, MetricKind::Counter);
        assert_eq!(counter.3, DebugValue::Counter(1));

        let latency = snapshot
            .iter()
            .find(|(name, ..)| name == HTTP_LATENCY)
            .expect("latency recorded");
        assert_eq!(latency.1, expected);
        match &latency.3 {
            DebugValue::Histogram(values) => {
                assert_eq!(values.len(), 1);
                assert!((values[0].into_inner() - 0.005).abs() < 1e-9);
            }
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_record_http_call_keys_by_status() {
        let snapshot = capture(|| {
            record_http_call("/healthz", 200, Duration::ZERO);
            record_http_call("/healthz", 200, Duration::ZERO);
            record_http_call("/healthz", 500, Duration::ZERO);
        });

        let ok = snapshot
            .iter()
            .find(|(name, l, ..)| {
                name == HTTP_CALLS && *l == labels(&[("handler", "/healthz"), ("code", "200")])
            })
            .expect("200 series");
        assert_eq!(ok.3, DebugValue::Counter(2));

        let failed = snapshot
            .iter()
            .find(|(name, l, ..)| {
                name == HTTP_CALLS && *l == labels(&[("handler", "/healthz"), ("code", "500")])
            })
            .expect("500 series");
        assert_eq!(failed.3, DebugValue::Counter(1));
    }

    #[test]
    fn test_record_response_size_has_no_labels() {
        let snapshot = capture(|| record_response_size(6));

        assert_eq!(snapshot.len(), 1);
        let (name, l, kind, value) = &snapshot[0];
        assert_eq!(name, RESPONSE_SIZE);
        assert!(l.is_empty());
        assert_eq!(*kind, MetricKind::Histogram);
        match value {
            DebugValue::Histogram(values) => assert_eq!(values.len(), 1),
            other => panic!("expected histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_prometheus_buckets_are_applied() {
        let recorder = prometheus_builder().unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_http_call("/", 200, Duration::from_millis(300));
            record_response_size(600);
        });

        let output = handle.render();
        let bucket = |name: &str, le: &str| {
            output
                .lines()
                .find(|line| {
                    line.starts_with(&format!("{name}_bucket"))
                        && line.contains(&format!("le=\"{le}\""))
                })
                .map(|line| line.rsplit(' ').next().unwrap_or_default().to_string())
        };

        assert_eq!(bucket(HTTP_LATENCY, "0.25").as_deref(), Some("0"));
        assert_eq!(bucket(HTTP_LATENCY, "0.5").as_deref(), Some("1"));
        assert_eq!(bucket(HTTP_LATENCY, "10").as_deref(), Some("1"));
        assert_eq!(bucket(RESPONSE_SIZE, "500").as_deref(), Some("0"));
        assert_eq!(bucket(RESPONSE_SIZE, "900").as_deref(), Some("1"));
        assert_eq!(bucket(RESPONSE_SIZE, "1500").as_deref(), Some("1"));
    }

    #[test]
    fn test_metrics_error_display() {
        let already_init = MetricsError::AlreadyInitialized;
        assert_eq!(
            already_init.to_string(),
            "metrics recorder already initialized"
        );

        let failed = MetricsError::InstallFailed("test error".to_string());
        assert!(failed.to_string().contains("test error"));
    }
}
