//! Report rendering for comparison results.

use std::fmt::Write as _;

use crate::models::{Protocol, RelativeMetric, TestRecord};

/// Printable view of a finished test
pub struct ComparisonReport<'a> {
    record: &'a TestRecord,
}

impl<'a> ComparisonReport<'a> {
    pub fn new(record: &'a TestRecord) -> Self {
        Self { record }
    }

    /// Render the results as an ASCII table
    pub fn render_table(&self) -> String {
        let record = self.record;
        let mut out = String::new();

        let _ = writeln!(out);
        let _ = writeln!(out, "╔══════════════════════════════════════════════════════════════════════════════════╗");
        let _ = writeln!(out, "║ {:<80} ║", format!("RPC vs HTTP: {}", record.test_name));
        let _ = writeln!(out, "║ {:<80} ║", format!("test {} ({})", record.test_id, status_label(record)));
        let _ = writeln!(out, "╚══════════════════════════════════════════════════════════════════════════════════╝");
        let _ = writeln!(out);
        let _ = writeln!(out, "┌────────────┬──────────┬──────────┬──────────┬──────────┬──────────────┬──────────┐");
        let _ = writeln!(out, "│ Protocol   │ Requests │  Failed  │ Success% │ Avg (ms) │ Throughput/s │ Time (s) │");
        let _ = writeln!(out, "├────────────┼──────────┼──────────┼──────────┼──────────┼──────────────┼──────────┤");

        for result in record.results.values() {
            let _ = writeln!(
                out,
                "│ {:<10} │ {:>8} │ {:>8} │ {:>7.1}% │ {:>8.2} │ {:>12.1} │ {:>8.2} │",
                result.protocol.as_str(),
                result.total_requests,
                result.failed_requests,
                result.success_rate,
                result.average_latency_ms,
                result.throughput_req_per_sec,
                result.total_duration_ms / 1000.0,
            );
        }

        let _ = writeln!(out, "└────────────┴──────────┴──────────┴──────────┴──────────┴──────────────┴──────────┘");

        for result in record.results.values() {
            if let Some(error) = &result.error {
                let _ = writeln!(out, "  {} failed: {}", result.protocol, error);
            }
        }

        if let Some(comparison) = &record.comparison {
            let _ = writeln!(out);
            for (protocol, metric) in &comparison.throughput_comparison {
                let _ = writeln!(out, "  throughput {:<10} {}", protocol.as_str(), relative(metric));
            }
            for (protocol, metric) in &comparison.latency_comparison {
                let _ = writeln!(out, "  latency    {:<10} {}", protocol.as_str(), relative(metric));
            }
        }

        out
    }

    /// Print the results as an ASCII table
    pub fn print_table(&self) {
        print!("{}", self.render_table());
        self.print_summary();
    }

    /// Export the record as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self.record).unwrap_or_default()
    }

    /// Print a compact summary
    pub fn print_summary(&self) {
        println!("\n=== Comparison Summary ===");
        let Some(comparison) = &self.record.comparison else {
            println!("No comparison available");
            return;
        };

        let summary = &comparison.summary;
        match summary.fastest_protocol {
            Some(protocol) => println!(
                "Highest throughput: {} ({:.1} req/s)",
                protocol, summary.max_throughput
            ),
            None => println!("Highest throughput: N/A"),
        }
        match summary.lowest_latency_protocol {
            Some(protocol) => println!(
                "Lowest latency: {} ({:.2} ms)",
                protocol, summary.min_latency
            ),
            None => println!("Lowest latency: N/A"),
        }
    }
}

fn status_label(record: &TestRecord) -> String {
    serde_json::to_value(record.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", record.status))
}

fn relative(metric: &RelativeMetric) -> String {
    let baseline: Protocol = metric.relative_to;
    match (metric.ratio, metric.improvement_percent) {
        (Some(ratio), Some(improvement)) => format!(
            "{:>10.2}  x{:.2} vs {} ({:+.1}%)",
            metric.value, ratio, baseline, improvement
        ),
        _ => format!("{:>10.2}  n/a vs {}", metric.value, baseline),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::compare;
    use crate::models::{ProtocolResult, TestConfiguration, TestStatus};

    fn record() -> TestRecord {
        let config = TestConfiguration::default();
        let mut record = TestRecord::new(config.clone());

        let mut grpc = ProtocolResult::failed(Protocol::BinaryRpc, &config, "");
        grpc.error = None;
        grpc.successful_requests = 100;
        grpc.failed_requests = 0;
        grpc.success_rate = 100.0;
        grpc.throughput_req_per_sec = 400.0;
        grpc.average_latency_ms = 2.5;

        let http = ProtocolResult::failed(Protocol::Http, &config, "connection refused");

        record.results.insert(Protocol::BinaryRpc, grpc);
        record.results.insert(Protocol::Http, http);
        record.comparison = Some(compare(&record.results));
        record.status = TestStatus::Completed;
        record
    }

    #[test]
    fn test_table_lists_protocols_in_order() {
        let record = record();
        let table = ComparisonReport::new(&record).render_table();

        let grpc_at = table.find("binaryRpc").unwrap();
        let http_at = table.find("│ http").unwrap();
        assert!(grpc_at < http_at);
        assert!(table.contains("completed"));
        assert!(table.contains("http failed: connection refused"));
        assert!(table.contains("400.0"));
    }

    #[test]
    fn test_json_export() {
        let record = record();
        let json = ComparisonReport::new(&record).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["results"]["binaryRpc"]["throughputReqPerSec"], 400.0);
    }
}
