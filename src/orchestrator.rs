//! Test orchestration.
//!
//! A comparison run registers a `running` [`TestRecord`], then runs each
//! requested protocol strictly one after another, so one protocol's load never
//! overlaps another's measurement. A protocol whose driver cannot be built is
//! recorded as an error entry and the remaining protocols still run.

use chrono::Utc;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::comparison;
use crate::controller;
use crate::drivers::{request_specs, TransportFactory};
use crate::error::EngineError;
use crate::metrics::{self, RunShape};
use crate::models::{Protocol, ProtocolResult, TestConfiguration, TestRecord, TestStatus};
use crate::payload;
use crate::registry::TestRegistry;

/// Tunables for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Pause between two protocol runs of the same test
    pub protocol_cooldown: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            protocol_cooldown: Duration::from_millis(1000),
        }
    }
}

/// Sequences protocol runs and owns the test registry
pub struct Orchestrator {
    registry: TestRegistry,
    connector: Arc<dyn TransportFactory>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        registry: TestRegistry,
        connector: Arc<dyn TransportFactory>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            connector,
            settings,
        }
    }

    pub fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    /// Run a comparison to completion and return the final record
    pub async fn run_comparison(&self, config: TestConfiguration) -> Result<TestRecord, EngineError> {
        let record = TestRecord::new(config.clone());
        let test_id = record.test_id;
        self.registry.insert(record);

        self.execute(test_id, config).await;
        self.registry.get(&test_id)
    }

    /// Register a comparison and run it in the background; returns the running record
    pub fn start_comparison(self: &Arc<Self>, config: TestConfiguration) -> TestRecord {
        let record = TestRecord::new(config.clone());
        let test_id = record.test_id;
        self.registry.insert(record.clone());

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.execute(test_id, config).await;
        });

        record
    }

    /// Current state of a test
    pub fn get_test_status(&self, test_id: &Uuid) -> Result<TestRecord, EngineError> {
        self.registry.get(test_id)
    }

    /// All tests, oldest first
    pub fn list_tests(&self) -> Vec<TestRecord> {
        self.registry.list()
    }

    /// Shutdown hook: mark running tests as interrupted
    pub fn interrupt_running(&self) -> usize {
        let count = self.registry.interrupt_running();
        if count > 0 {
            tracing::warn!(count, "Marked running tests as interrupted");
        }
        count
    }

    async fn execute(&self, test_id: Uuid, config: TestConfiguration) {
        tracing::info!(
            test_id = %test_id,
            test_name = %config.test_name,
            num_requests = config.num_requests,
            concurrency = config.concurrency,
            request_size = config.request_size,
            response_size = config.response_size,
            streaming = config.use_streaming,
            "Starting comparison test"
        );

        let run = AssertUnwindSafe(self.run_protocols(test_id, &config))
            .catch_unwind()
            .await;

        let finished = self.registry.update(&test_id, |record| {
            // Shutdown may have interrupted the record already
            if record.status != TestStatus::Running {
                return;
            }
            match run {
                Ok(()) => {
                    record.comparison = Some(comparison::compare(&comparable(&record.results)));
                    record.status = TestStatus::Completed;
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    tracing::error!(test_id = %record.test_id, error = %message, "Test run failed");
                    record.error = Some(message);
                    record.status = TestStatus::Failed;
                }
            }
            record.end_time = Some(Utc::now());
        });

        if let Err(e) = finished {
            tracing::error!(test_id = %test_id, error = %e, "Test record disappeared");
            return;
        }

        tracing::info!(test_id = %test_id, "Comparison test finished");
    }

    async fn run_protocols(&self, test_id: Uuid, config: &TestConfiguration) {
        if config.num_requests == 0 || config.protocols.is_empty() {
            tracing::info!(test_id = %test_id, "Nothing to run");
            return;
        }

        for (position, protocol) in config.protocols.iter().copied().enumerate() {
            if position > 0 && !self.settings.protocol_cooldown.is_zero() {
                tokio::time::sleep(self.settings.protocol_cooldown).await;
            }

            let result = match self.run_protocol(protocol, config).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(protocol = %protocol, error = %e, "Protocol run failed");
                    ProtocolResult::failed(protocol, config, e.to_string())
                }
            };

            if let Err(e) = self.registry.update(&test_id, |record| {
                record.results.insert(protocol, result);
            }) {
                tracing::error!(test_id = %test_id, error = %e, "Could not store protocol result");
            }
        }
    }

    async fn run_protocol(
        &self,
        protocol: Protocol,
        config: &TestConfiguration,
    ) -> Result<ProtocolResult, EngineError> {
        tracing::info!(protocol = %protocol, "Starting protocol run");

        let transport = self.connector.connect(protocol).await?;
        let payload = payload::generate(config.request_size, config.payload_mode);
        let streaming = config.use_streaming
            && protocol == Protocol::BinaryRpc
            && transport.supports_streaming();

        if config.warmup_requests > 0 {
            let warmup = controller::run(
                config.warmup_requests,
                config.concurrency,
                request_specs(config, &payload, "warmup"),
                transport.clone(),
            )
            .await;
            let failed = warmup.iter().filter(|o| !o.success).count();
            tracing::debug!(protocol = %protocol, requests = warmup.len(), failed, "Warmup finished");
        }

        let factory = request_specs(config, &payload, "perf-test");
        let start = Instant::now();
        let outcomes = if streaming {
            controller::run_streaming(config.num_requests, config.concurrency, factory, transport)
                .await
        } else {
            controller::run(config.num_requests, config.concurrency, factory, transport).await
        };
        let wall_clock_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = metrics::aggregate(
            &outcomes,
            wall_clock_ms,
            config.num_requests as u64,
            RunShape {
                protocol,
                // A stream is one in-flight call
                concurrency: if streaming { 1 } else { config.concurrency },
                request_size: config.request_size,
                response_size: config.response_size,
                streaming,
            },
        );

        if let Some(first_error) = outcomes.iter().find_map(|o| o.error_message.as_deref()) {
            tracing::warn!(
                protocol = %protocol,
                failed = result.failed_requests,
                first_error,
                "Some requests failed"
            );
        }

        tracing::info!(
            protocol = %protocol,
            throughput = result.throughput_req_per_sec,
            avg_latency_ms = result.average_latency_ms,
            success_rate = result.success_rate,
            successful = result.successful_requests,
            total = result.total_requests,
            "Protocol run completed"
        );

        Ok(result)
    }
}

/// Results that took part in the run; error entries are left out
fn comparable(results: &BTreeMap<Protocol, ProtocolResult>) -> BTreeMap<Protocol, ProtocolResult> {
    results
        .iter()
        .filter(|(_, r)| !r.is_error())
        .map(|(p, r)| (*p, r.clone()))
        .collect()
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "test run panicked".to_string()
    }
}
