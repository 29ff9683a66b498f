//! Concurrency controller.
//!
//! Requests are dispatched in consecutive batches of
//! `min(concurrency, remaining)`. Every batch settles completely before the
//! next one starts, which caps the number of in-flight requests at
//! `concurrency`. A failed request never cancels its siblings.

use std::sync::Arc;
use tokio::task::JoinSet;

use crate::drivers::{RequestSpec, Transport};
use crate::models::RequestOutcome;

/// Run `total_requests` requests through `transport`, at most `concurrency` at a time.
///
/// Outcomes are returned in completion order within each batch. A concurrency
/// of zero is treated as one.
pub async fn run<F>(
    total_requests: usize,
    concurrency: usize,
    request_factory: F,
    transport: Arc<dyn Transport>,
) -> Vec<RequestOutcome>
where
    F: Fn(usize) -> RequestSpec,
{
    let concurrency = concurrency.max(1);
    let mut outcomes = Vec::with_capacity(total_requests);
    let mut next = 0;
    let mut batch_number = 0;

    while next < total_requests {
        let batch_size = concurrency.min(total_requests - next);
        let mut batch = JoinSet::new();

        for index in next..next + batch_size {
            let request = request_factory(index);
            let transport = transport.clone();
            batch.spawn(async move { transport.send_one(request).await });
        }

        while let Some(joined) = batch.join_next().await {
            outcomes.push(joined.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Request task did not complete");
                RequestOutcome::failure(format!("request task failed: {}", e))
            }));
        }

        next += batch_size;
        batch_number += 1;
        tracing::trace!(
            batch = batch_number,
            batch_size,
            completed = next,
            total = total_requests,
            "Batch settled"
        );
    }

    outcomes
}

/// Send every request over a single stream of `transport`.
///
/// Falls back to batched dispatch when the transport has no stream mode.
pub async fn run_streaming<F>(
    total_requests: usize,
    concurrency: usize,
    request_factory: F,
    transport: Arc<dyn Transport>,
) -> Vec<RequestOutcome>
where
    F: Fn(usize) -> RequestSpec,
{
    if !transport.supports_streaming() {
        tracing::debug!(
            protocol = %transport.protocol(),
            "Transport has no stream mode, using batched dispatch"
        );
        return run(total_requests, concurrency, request_factory, transport).await;
    }

    let requests: Vec<RequestSpec> = (0..total_requests).map(&request_factory).collect();
    let mut outcomes = transport.send_stream(requests).await;

    // A transport must answer every request; pad or trim to keep counts exact
    outcomes.truncate(total_requests);
    while outcomes.len() < total_requests {
        outcomes.push(RequestOutcome::failure("no response received on stream"));
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::models::{PayloadMode, Protocol};

    /// Counts requests in flight and fails every request whose index is listed
    struct CountingTransport {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        fail_ids: Vec<String>,
        delay: Duration,
    }

    impl CountingTransport {
        fn new(delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                fail_ids: Vec::new(),
                delay,
            }
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        fn protocol(&self) -> Protocol {
            Protocol::Http
        }

        async fn send_one(&self, request: RequestSpec) -> RequestOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_ids.contains(&request.id) {
                RequestOutcome::failure("injected failure")
            } else {
                RequestOutcome::success(self.delay.as_secs_f64() * 1000.0, None)
            }
        }
    }

    fn factory(index: usize) -> RequestSpec {
        RequestSpec {
            id: format!("req-{}", index),
            payload: Bytes::from_static(b"payload"),
            response_size: 0,
            payload_mode: PayloadMode::Binary,
        }
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_concurrency() {
        for (total, concurrency) in [(10, 3), (7, 7), (5, 20), (1, 1), (12, 4)] {
            let transport = Arc::new(CountingTransport::new(Duration::from_millis(5)));
            let outcomes = run(total, concurrency, factory, transport.clone()).await;

            assert_eq!(outcomes.len(), total);
            assert_eq!(transport.calls.load(Ordering::SeqCst), total);
            let max = transport.max_in_flight.load(Ordering::SeqCst);
            assert!(
                max <= concurrency.min(total),
                "max in flight {} for ({}, {})",
                max,
                total,
                concurrency
            );
        }
    }

    #[tokio::test]
    async fn test_batch_runs_in_parallel() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(20)));
        run(8, 4, factory, transport.clone()).await;
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_run() {
        let mut transport = CountingTransport::new(Duration::from_millis(1));
        transport.fail_ids = vec!["req-0".to_string(), "req-4".to_string()];
        let transport = Arc::new(transport);

        let outcomes = run(6, 2, factory, transport).await;
        assert_eq!(outcomes.len(), 6);
        assert_eq!(outcomes.iter().filter(|o| !o.success).count(), 2);
    }

    #[tokio::test]
    async fn test_zero_requests() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let outcomes = run(0, 4, factory, transport.clone()).await;
        assert!(outcomes.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_treated_as_one() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let outcomes = run(3, 0, factory, transport.clone()).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_streaming_falls_back_to_batches() {
        let transport = Arc::new(CountingTransport::new(Duration::from_millis(1)));
        let outcomes = run_streaming(5, 2, factory, transport.clone()).await;
        assert_eq!(outcomes.len(), 5);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    /// Stream transport that answers only the first `answered` requests
    struct ShortStream {
        answered: usize,
    }

    #[async_trait]
    impl Transport for ShortStream {
        fn protocol(&self) -> Protocol {
            Protocol::BinaryRpc
        }

        async fn send_one(&self, _request: RequestSpec) -> RequestOutcome {
            RequestOutcome::success(1.0, None)
        }

        fn supports_streaming(&self) -> bool {
            true
        }

        async fn send_stream(&self, requests: Vec<RequestSpec>) -> Vec<RequestOutcome> {
            requests
                .iter()
                .take(self.answered)
                .map(|_| RequestOutcome::success(2.0, Some(1_000)))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_streaming_pads_missing_responses() {
        let transport = Arc::new(ShortStream { answered: 3 });
        let outcomes = run_streaming(5, 2, factory, transport).await;
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 3);
        assert_eq!(
            outcomes[4].error_message.as_deref(),
            Some("no response received on stream")
        );
    }
}
