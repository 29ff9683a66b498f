//! Relative throughput/latency metrics across protocol results.
//!
//! The baseline is the binary-RPC result when present, otherwise the first
//! result in iteration order.

use std::collections::BTreeMap;

use crate::models::{
    ComparisonMetrics, ComparisonSummary, Protocol, ProtocolResult, RelativeMetric,
};

/// Build comparison metrics for a set of results
pub fn compare(results: &BTreeMap<Protocol, ProtocolResult>) -> ComparisonMetrics {
    let Some(baseline) = select_baseline(results) else {
        return ComparisonMetrics::default();
    };

    let mut throughput_comparison = BTreeMap::new();
    let mut latency_comparison = BTreeMap::new();

    for (protocol, result) in results {
        let throughput = result.throughput_req_per_sec;
        let base_throughput = baseline.throughput_req_per_sec;
        throughput_comparison.insert(
            *protocol,
            RelativeMetric {
                value: throughput,
                relative_to: baseline.protocol,
                ratio: guarded(throughput, base_throughput, |v, b| v / b),
                improvement_percent: guarded(throughput, base_throughput, |v, b| (v - b) / b * 100.0),
            },
        );

        // Lower latency is better, so the improvement sign is inverted
        let latency = result.average_latency_ms;
        let base_latency = baseline.average_latency_ms;
        latency_comparison.insert(
            *protocol,
            RelativeMetric {
                value: latency,
                relative_to: baseline.protocol,
                ratio: guarded(latency, base_latency, |v, b| v / b),
                improvement_percent: guarded(latency, base_latency, |v, b| (b - v) / b * 100.0),
            },
        );
    }

    ComparisonMetrics {
        throughput_comparison,
        latency_comparison,
        summary: summarize(results),
    }
}

fn select_baseline(results: &BTreeMap<Protocol, ProtocolResult>) -> Option<&ProtocolResult> {
    results
        .get(&Protocol::BinaryRpc)
        .or_else(|| results.values().next())
}

/// Apply `f` unless the baseline is zero or the result is not finite
fn guarded(value: f64, baseline: f64, f: impl Fn(f64, f64) -> f64) -> Option<f64> {
    if baseline == 0.0 || !baseline.is_finite() {
        return None;
    }
    Some(f(value, baseline)).filter(|r| r.is_finite())
}

/// Arg-max throughput and arg-min latency; ties keep the first result
fn summarize(results: &BTreeMap<Protocol, ProtocolResult>) -> ComparisonSummary {
    let mut summary = ComparisonSummary::default();

    for (protocol, result) in results {
        let throughput = result.throughput_req_per_sec;
        if summary.fastest_protocol.is_none() || throughput > summary.max_throughput {
            summary.fastest_protocol = Some(*protocol);
            summary.max_throughput = throughput;
        }

        let latency = result.average_latency_ms;
        if summary.lowest_latency_protocol.is_none() || latency < summary.min_latency {
            summary.lowest_latency_protocol = Some(*protocol);
            summary.min_latency = latency;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestConfiguration;

    fn result(protocol: Protocol, throughput: f64, latency: f64) -> ProtocolResult {
        let mut r = ProtocolResult::failed(protocol, &TestConfiguration::default(), "");
        r.error = None;
        r.throughput_req_per_sec = throughput;
        r.average_latency_ms = latency;
        r
    }

    fn results(entries: Vec<ProtocolResult>) -> BTreeMap<Protocol, ProtocolResult> {
        entries.into_iter().map(|r| (r.protocol, r)).collect()
    }

    #[test]
    fn test_equal_results_are_neutral() {
        let metrics = compare(&results(vec![
            result(Protocol::BinaryRpc, 200.0, 10.0),
            result(Protocol::Http, 200.0, 10.0),
        ]));

        let http = &metrics.throughput_comparison[&Protocol::Http];
        assert!((http.ratio.unwrap() - 1.0).abs() < 1e-9);
        assert!(http.improvement_percent.unwrap().abs() < 1e-9);

        let http_latency = &metrics.latency_comparison[&Protocol::Http];
        assert!((http_latency.ratio.unwrap() - 1.0).abs() < 1e-9);
        assert!(http_latency.improvement_percent.unwrap().abs() < 1e-9);
    }

    // Binary-RPC as baseline is a convention; ratios against any other
    // baseline carry the same information.
    #[test]
    fn test_baseline_prefers_binary_rpc() {
        let metrics = compare(&results(vec![
            result(Protocol::Http, 100.0, 20.0),
            result(Protocol::BinaryRpc, 200.0, 10.0),
        ]));

        let http = &metrics.throughput_comparison[&Protocol::Http];
        assert_eq!(http.relative_to, Protocol::BinaryRpc);
        assert!((http.ratio.unwrap() - 0.5).abs() < 1e-9);
        assert!((http.improvement_percent.unwrap() + 50.0).abs() < 1e-9);

        // HTTP latency is twice the baseline: -100% improvement
        let http_latency = &metrics.latency_comparison[&Protocol::Http];
        assert!((http_latency.ratio.unwrap() - 2.0).abs() < 1e-9);
        assert!((http_latency.improvement_percent.unwrap() + 100.0).abs() < 1e-9);

        assert_eq!(metrics.summary.fastest_protocol, Some(Protocol::BinaryRpc));
        assert_eq!(metrics.summary.lowest_latency_protocol, Some(Protocol::BinaryRpc));
        assert_eq!(metrics.summary.max_throughput, 200.0);
        assert_eq!(metrics.summary.min_latency, 10.0);
    }

    #[test]
    fn test_baseline_falls_back_to_first() {
        let metrics = compare(&results(vec![result(Protocol::Http, 50.0, 4.0)]));
        let http = &metrics.throughput_comparison[&Protocol::Http];
        assert_eq!(http.relative_to, Protocol::Http);
        assert_eq!(http.ratio, Some(1.0));
    }

    #[test]
    fn test_zero_baseline_yields_sentinel() {
        let metrics = compare(&results(vec![
            result(Protocol::BinaryRpc, 0.0, 0.0),
            result(Protocol::Http, 120.0, 8.0),
        ]));

        for metric in metrics
            .throughput_comparison
            .values()
            .chain(metrics.latency_comparison.values())
        {
            assert!(metric.ratio.is_none());
            assert!(metric.improvement_percent.is_none());
        }

        let json = serde_json::to_string(&metrics).unwrap();
        assert!(!json.contains("NaN"));
        assert!(!json.contains("inf"));
        assert!(json.contains("\"ratio\":null"));
    }

    #[test]
    fn test_ties_keep_first() {
        let metrics = compare(&results(vec![
            result(Protocol::BinaryRpc, 100.0, 5.0),
            result(Protocol::Http, 100.0, 5.0),
        ]));
        assert_eq!(metrics.summary.fastest_protocol, Some(Protocol::BinaryRpc));
        assert_eq!(metrics.summary.lowest_latency_protocol, Some(Protocol::BinaryRpc));
    }

    #[test]
    fn test_empty_results() {
        let metrics = compare(&BTreeMap::new());
        assert!(metrics.throughput_comparison.is_empty());
        assert!(metrics.latency_comparison.is_empty());
        assert_eq!(metrics.summary, ComparisonSummary::default());
        assert_eq!(metrics.summary.max_throughput, 0.0);
    }
}
