//! Integration tests for sqlgate.

pub mod metadata_test;
pub mod postgres_test;
pub mod query_test;
pub mod saved_queries_test;

use sqlgate::audit::{QueryRecord, StatsSink};
use std::sync::Mutex;

/// Keeps every record it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<QueryRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<QueryRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl StatsSink for RecordingSink {
    fn record(&self, record: &QueryRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
