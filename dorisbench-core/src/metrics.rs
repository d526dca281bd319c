use std::collections::HashSet;
use std::time::Duration;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Ingestion timings for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadMetrics {
    /// Records handed to the uploader (including ones without a vector)
    pub record_count: usize,
    pub batch_count: usize,
    /// Batch submission only
    pub upload_time_secs: f64,
    /// Time spent in the post-upload step
    pub post_upload_secs: f64,
    /// upload + post-upload
    pub total_time_secs: f64,
}

/// Results of one search experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMetrics {
    /// When the experiment started
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub parallel: usize,
    pub top: usize,
    pub query_count: usize,
    /// Wall-clock time across all workers
    pub total_time_secs: f64,
    /// Queries per second achieved
    pub rps: f64,
    /// Mean precision@top over queries with known neighbours
    pub mean_precision: Option<f64>,
    /// Latency percentiles in microseconds
    pub latency: LatencyMetrics,
}

/// Latency percentiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Accumulates per-query latency and precision for one experiment
pub struct SearchRecorder {
    /// Histogram for latency tracking (in microseconds)
    latency_histogram: Histogram<u64>,
    precisions: Vec<f64>,
    queries: usize,
}

impl SearchRecorder {
    pub fn new() -> Self {
        Self {
            // Track latencies from 1us to 60 seconds with 3 significant figures
            latency_histogram: Histogram::new_with_bounds(1, 60_000_000, 3)
                .expect("static histogram bounds are valid"),
            precisions: Vec::new(),
            queries: 0,
        }
    }

    /// Record one query's latency and, when known, its precision
    pub fn record(&mut self, latency: Duration, precision: Option<f64>) {
        self.queries += 1;
        let latency_us = (latency.as_micros() as u64).max(1);
        self.latency_histogram.saturating_record(latency_us);
        if let Some(p) = precision {
            self.precisions.push(p);
        }
    }

    /// Finish the experiment given its total wall-clock time
    pub fn finish(
        &self,
        timestamp: chrono::DateTime<chrono::Utc>,
        parallel: usize,
        top: usize,
        total: Duration,
    ) -> SearchMetrics {
        let total_secs = total.as_secs_f64();
        let rps = if total_secs > 0.0 {
            self.queries as f64 / total_secs
        } else {
            0.0
        };

        let mean_precision = if self.precisions.is_empty() {
            None
        } else {
            Some(self.precisions.iter().sum::<f64>() / self.precisions.len() as f64)
        };

        SearchMetrics {
            timestamp,
            parallel,
            top,
            query_count: self.queries,
            total_time_secs: total_secs,
            rps,
            mean_precision,
            latency: self.latency(),
        }
    }

    fn latency(&self) -> LatencyMetrics {
        if self.latency_histogram.is_empty() {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            min_us: self.latency_histogram.min(),
            max_us: self.latency_histogram.max(),
            mean_us: self.latency_histogram.mean(),
            p50_us: self.latency_histogram.value_at_quantile(0.50),
            p95_us: self.latency_histogram.value_at_quantile(0.95),
            p99_us: self.latency_histogram.value_at_quantile(0.99),
        }
    }
}

impl Default for SearchRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of the first `k` expected ids found among the first `k` returned.
/// Ground truth shorter than `k` caps the denominator, not the returned list.
pub fn precision_at_k(returned: &[u64], expected: &[u64], k: usize) -> f64 {
    let relevant = k.min(expected.len());
    if relevant == 0 {
        return 0.0;
    }

    let expected_set: HashSet<u64> = expected.iter().take(relevant).copied().collect();
    let hits = returned
        .iter()
        .take(k)
        .filter(|id| expected_set.contains(*id))
        .count();

    hits as f64 / relevant as f64
}
