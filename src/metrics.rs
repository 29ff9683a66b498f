//! Reduction of request outcomes into a per-protocol result.

use crate::models::{Protocol, ProtocolResult, RequestOutcome};

/// Running totals over a stream of outcomes
#[derive(Debug, Default, Clone)]
pub struct MetricsAggregator {
    /// Outcomes seen so far
    outcome_count: u64,
    /// Outcomes with `success = true`
    success_count: u64,
    /// Sum and count of outcomes that carry a client latency
    latency_sum_ms: f64,
    latency_count: u64,
    /// Sum and count of server-reported processing times
    server_time_sum_ns: f64,
    server_time_count: u64,
}

/// Run parameters copied onto the result
#[derive(Debug, Clone, Copy)]
pub struct RunShape {
    pub protocol: Protocol,
    pub concurrency: usize,
    pub request_size: usize,
    pub response_size: usize,
    pub streaming: bool,
}

impl MetricsAggregator {
    /// Create a new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome
    pub fn record(&mut self, outcome: &RequestOutcome) {
        self.outcome_count += 1;
        if outcome.success {
            self.success_count += 1;
        }
        if let Some(latency) = outcome.client_latency_ms.filter(|l| l.is_finite()) {
            self.latency_sum_ms += latency;
            self.latency_count += 1;
        }
        if let Some(ns) = outcome.server_processing_time_ns {
            self.server_time_sum_ns += ns as f64;
            self.server_time_count += 1;
        }
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn outcome_count(&self) -> u64 {
        self.outcome_count
    }

    /// Mean client latency; 0 when no outcome carried one
    pub fn average_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            return 0.0;
        }
        self.latency_sum_ms / self.latency_count as f64
    }

    /// Mean server processing time in milliseconds, if any was reported
    pub fn average_server_processing_ms(&self) -> Option<f64> {
        if self.server_time_count == 0 {
            return None;
        }
        Some(self.server_time_sum_ns / self.server_time_count as f64 / 1_000_000.0)
    }

    /// Build the result. `failed = attempted - successful`, so outcomes that
    /// never came back still count as failures.
    pub fn finish(
        &self,
        shape: RunShape,
        wall_clock_duration_ms: f64,
        total_requests_attempted: u64,
    ) -> ProtocolResult {
        let successful = self.success_count.min(total_requests_attempted);
        let failed = total_requests_attempted - successful;

        ProtocolResult {
            protocol: shape.protocol,
            total_requests: total_requests_attempted,
            successful_requests: successful,
            failed_requests: failed,
            success_rate: success_rate(successful, total_requests_attempted),
            average_latency_ms: self.average_latency_ms(),
            average_server_processing_ms: self.average_server_processing_ms(),
            throughput_req_per_sec: throughput(successful, wall_clock_duration_ms),
            total_duration_ms: wall_clock_duration_ms,
            concurrency: shape.concurrency,
            request_size: shape.request_size,
            response_size: shape.response_size,
            streaming: shape.streaming,
            error: None,
        }
    }
}

/// Reduce a finite list of outcomes into a result
pub fn aggregate(
    outcomes: &[RequestOutcome],
    wall_clock_duration_ms: f64,
    total_requests_attempted: u64,
    shape: RunShape,
) -> ProtocolResult {
    let mut aggregator = MetricsAggregator::new();
    for outcome in outcomes {
        aggregator.record(outcome);
    }
    aggregator.finish(shape, wall_clock_duration_ms, total_requests_attempted)
}

/// Successful requests per second of wall-clock time; 0 for a zero or invalid duration
pub fn throughput(successful: u64, wall_clock_duration_ms: f64) -> f64 {
    if !wall_clock_duration_ms.is_finite() || wall_clock_duration_ms <= 0.0 {
        return 0.0;
    }
    successful as f64 / wall_clock_duration_ms * 1000.0
}

fn success_rate(successful: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    successful as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> RunShape {
        RunShape {
            protocol: Protocol::Http,
            concurrency: 2,
            request_size: 1024,
            response_size: 2048,
            streaming: false,
        }
    }

    #[test]
    fn test_average_is_exact_mean() {
        let outcomes = vec![
            RequestOutcome::success(10.0, Some(2_000_000)),
            RequestOutcome::success(20.0, Some(4_000_000)),
            RequestOutcome::success(45.0, None),
            RequestOutcome::failure("timeout"),
        ];

        let result = aggregate(&outcomes, 1000.0, 4, shape());
        assert_eq!(result.successful_requests, 3);
        assert_eq!(result.failed_requests, 1);
        assert!((result.average_latency_ms - 25.0).abs() < 1e-9);
        assert!((result.average_server_processing_ms.unwrap() - 3.0).abs() < 1e-9);
        assert!((result.success_rate - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_latency_counts_when_present() {
        let outcomes = vec![
            RequestOutcome::success(10.0, None),
            RequestOutcome {
                success: false,
                client_latency_ms: Some(30.0),
                server_processing_time_ns: None,
                error_message: Some("HTTP 500".to_string()),
            },
        ];

        let result = aggregate(&outcomes, 100.0, 2, shape());
        assert!((result.average_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_throughput_from_wall_clock() {
        let outcomes: Vec<_> = (0..10).map(|_| RequestOutcome::success(5.0, None)).collect();
        let result = aggregate(&outcomes, 2000.0, 10, shape());
        assert_eq!(result.throughput_req_per_sec, 5.0);
    }

    #[test]
    fn test_zero_duration_and_no_outcomes() {
        let result = aggregate(&[], 0.0, 0, shape());
        assert_eq!(result.total_requests, 0);
        assert_eq!(result.successful_requests + result.failed_requests, 0);
        assert_eq!(result.average_latency_ms, 0.0);
        assert_eq!(result.throughput_req_per_sec, 0.0);
        assert_eq!(result.success_rate, 0.0);
        assert!(result.average_server_processing_ms.is_none());
    }

    #[test]
    fn test_missing_outcomes_count_as_failed() {
        let outcomes = vec![RequestOutcome::success(1.0, None)];
        let result = aggregate(&outcomes, 10.0, 5, shape());
        assert_eq!(result.successful_requests, 1);
        assert_eq!(result.failed_requests, 4);
        assert_eq!(result.successful_requests + result.failed_requests, result.total_requests);
    }

    #[test]
    fn test_nan_duration_yields_zero_throughput() {
        assert_eq!(throughput(10, f64::NAN), 0.0);
        assert_eq!(throughput(10, -5.0), 0.0);
    }
}
