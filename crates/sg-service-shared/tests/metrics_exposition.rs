//! `/metrics` exposition integration test.
//!
//! Installs the global Prometheus recorder, so this file holds a single test
//! and runs in its own process.

mod common;

use axum::http::StatusCode;
use sg_service_shared::metrics::{HTTP_CALLS, HTTP_LATENCY, RESPONSE_SIZE};
use sg_service_shared::{build_router, init_metrics, root_span, MetricsError};

use common::get;

/// Value of the first sample line for `name` carrying every label in `labels`.
fn sample(exposition: &str, name: &str, labels: &[&str]) -> Option<f64> {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find(|line| {
            let series = line.split(['{', ' ']).next().unwrap_or_default();
            (series == name || series == format!("{name}_total"))
                && labels.iter().all(|l| line.contains(l))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

#[tokio::test]
async fn test_metrics_report_every_instrumented_request() {
    init_metrics().unwrap();
    assert!(matches!(
        init_metrics(),
        Err(MetricsError::AlreadyInitialized)
    ));

    let router = build_router(&root_span("test"));

    for _ in 0..5 {
        assert_eq!(get(&router, "/version").await.0, StatusCode::OK);
    }
    for _ in 0..3 {
        assert_eq!(get(&router, "/healthz").await.0, StatusCode::OK);
    }
    for uri in ["/", "/foo/bar"] {
        assert_eq!(get(&router, uri).await.0, StatusCode::OK);
    }

    let (status, exposition) = get(&router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let version = ["handler=\"/version\"", "code=\"200\""];
    let health = ["handler=\"/healthz\"", "code=\"200\""];
    let catch_all = ["handler=\"/\"", "code=\"200\""];

    assert_eq!(sample(&exposition, HTTP_CALLS, &version), Some(5.0));
    assert_eq!(sample(&exposition, HTTP_CALLS, &health), Some(3.0));
    assert_eq!(sample(&exposition, HTTP_CALLS, &catch_all), Some(2.0));

    let latency_count = format!("{HTTP_LATENCY}_count");
    assert_eq!(sample(&exposition, &latency_count, &version), Some(5.0));
    assert_eq!(sample(&exposition, &latency_count, &health), Some(3.0));
    assert_eq!(sample(&exposition, &latency_count, &catch_all), Some(2.0));

    // One size observation per instrumented request; `/metrics` itself is not counted.
    let size_count = format!("{RESPONSE_SIZE}_count");
    assert_eq!(sample(&exposition, &size_count, &[]), Some(10.0));

    // "ok" x3 + "Hello!" x2 + version x5
    let size_sum = format!("{RESPONSE_SIZE}_sum");
    let expected_bytes = 3 * 2 + 2 * 6 + 5 * sg_service_shared::VERSION.len();
    assert_eq!(
        sample(&exposition, &size_sum, &[]),
        Some(expected_bytes as f64)
    );

    assert!(
        !exposition.contains("handler=\"/metrics\""),
        "/metrics must bypass instrumentation"
    );
}
