//! Prometheus metrics exposition
//!
//! - `connector_analyses_total` (counter): label `outcome`
//! - `connector_analysis_duration_seconds` (histogram): label `outcome`
//!
//! The client crate additionally emits `wildfire_api_replies_total` per
//! upstream status; it lands in the same recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `connector_analysis_duration_seconds` gets explicit buckets so it renders
/// as a real histogram (`_bucket` lines). Analyses routinely take minutes —
/// a submit plus up to twenty 30-second polls — so the buckets run from one
/// second to twenty minutes.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "connector_analysis_duration_seconds".to_string(),
            ),
            &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one finished analysis with its outcome label.
pub fn record_analysis(outcome: &str, duration_secs: f64) {
    metrics::counter!("connector_analyses_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("connector_analysis_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}
