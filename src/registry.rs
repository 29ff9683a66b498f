// In-memory test registry
// Records live for the whole process; there is no eviction

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{TestRecord, TestStatus};

/// Thread-safe map of test id to record, readable while tests are running
#[derive(Clone, Default)]
pub struct TestRegistry {
    records: Arc<DashMap<Uuid, TestRecord>>,
}

impl TestRegistry {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record
    pub fn insert(&self, record: TestRecord) {
        tracing::debug!(test_id = %record.test_id, "Registered test");
        self.records.insert(record.test_id, record);
    }

    /// Snapshot of a record
    pub fn get(&self, test_id: &Uuid) -> Result<TestRecord, EngineError> {
        self.records
            .get(test_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::NotFound(*test_id))
    }

    /// Mutate a record in place
    pub fn update<F>(&self, test_id: &Uuid, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut TestRecord),
    {
        let mut entry = self
            .records
            .get_mut(test_id)
            .ok_or(EngineError::NotFound(*test_id))?;
        f(entry.value_mut());
        Ok(())
    }

    /// All records ordered by start time
    pub fn list(&self) -> Vec<TestRecord> {
        let mut records: Vec<TestRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.start_time);
        records
    }

    /// Number of records in the `running` state
    pub fn running_count(&self) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.status == TestStatus::Running)
            .count()
    }

    /// Mark every running record as interrupted; returns how many were changed
    pub fn interrupt_running(&self) -> usize {
        let now = Utc::now();
        let mut interrupted = 0;
        for mut entry in self.records.iter_mut() {
            if entry.status == TestStatus::Running {
                entry.status = TestStatus::Interrupted;
                entry.end_time = Some(now);
                entry.error = Some("Interrupted by shutdown".to_string());
                interrupted += 1;
            }
        }
        interrupted
    }
}
