//! Metrics and observability utilities
//!
//! Pipeline counters and histograms with standardized naming. Recording is a
//! no-op until a recorder (e.g. the Prometheus exporter) is installed.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PaperLink metrics
pub const METRICS_PREFIX: &str = "paperlink";

/// Buckets for per-document stage latency (in seconds)
pub const STAGE_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    5.000, // 5s
    30.00, // 30s
    120.0, // 2m
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Ingestion
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents turned into a section tree and chunks"
    );

    describe_counter!(
        format!("{}_sections_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total sections created, root excluded"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total fine chunks created"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Tree building and chunking latency in seconds"
    );

    describe_counter!(
        format!("{}_structural_anomalies_total", METRICS_PREFIX),
        Unit::Count,
        "Recoverable structural anomalies by kind"
    );

    // Embeddings
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding and caption requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding request latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Embedding requests that failed after retries"
    );

    // Linking
    describe_counter!(
        format!("{}_image_links_total", METRICS_PREFIX),
        Unit::Count,
        "Image linking decisions by outcome"
    );

    describe_histogram!(
        format!("{}_linking_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Whole-document linking latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Times one embedding request
pub struct EmbeddingTimer {
    start: Instant,
    kind: &'static str,
}

impl EmbeddingTimer {
    pub fn start(kind: &'static str) -> Self {
        Self {
            start: Instant::now(),
            kind,
        }
    }

    pub fn finish(self, success: bool) {
        record_embedding(self.start.elapsed().as_secs_f64(), self.kind, success);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, kind: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "kind" => kind.to_string()
        )
        .increment(1);
    }
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, sections_created: usize, chunks_created: usize) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX)).increment(1);

    counter!(format!("{}_sections_created_total", METRICS_PREFIX))
        .increment(sections_created as u64);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX))
        .increment(chunks_created as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

pub fn record_anomaly(kind: &'static str) {
    counter!(
        format!("{}_structural_anomalies_total", METRICS_PREFIX),
        "kind" => kind
    )
    .increment(1);
}

/// Helper to record one linking decision
pub fn record_link(outcome: &'static str) {
    counter!(
        format!("{}_image_links_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_linking_duration(duration_secs: f64) {
    histogram!(format!("{}_linking_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [STAGE_BUCKETS, EMBEDDING_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recording_without_recorder() {
        let timer = EmbeddingTimer::start("image");
        timer.finish(false);
        record_ingestion(0.01, 3, 7);
        record_anomaly("empty_section");
        record_link("confirmed");
        // Just verify it runs without panic
    }
}
