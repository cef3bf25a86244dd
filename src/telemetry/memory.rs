use async_trait::async_trait;
use std::sync::Mutex;

use super::record::TelemetryRecord;
use super::store::{StoreResult, StoreSnapshot, TelemetryStore};
use crate::goals::{Assessment, AssessmentFilter};

/// Process-local backend. Holds the snapshot in memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryTelemetryStore {
    snapshot: Mutex<StoreSnapshot>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TelemetryRecord>) -> Self {
        Self {
            snapshot: Mutex::new(StoreSnapshot::with_records(records)),
        }
    }

    fn with_snapshot<R>(&self, f: impl FnOnce(&mut StoreSnapshot) -> R) -> R {
        let mut guard = self.snapshot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn len(&self) -> usize {
        self.with_snapshot(|s| s.telemetry_data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.with_snapshot(|s| *s = StoreSnapshot::default());
    }
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    async fn read(&self) -> StoreResult<StoreSnapshot> {
        let snapshot = self.with_snapshot(|s| s.clone());
        snapshot.validate("memory");
        Ok(snapshot)
    }

    async fn store_all(&self, records: Vec<TelemetryRecord>) -> StoreResult<()> {
        self.with_snapshot(|s| s.telemetry_data.extend(records));
        Ok(())
    }

    async fn store_assessments(&self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> StoreResult<()> {
        self.with_snapshot(|s| s.append_assessments(assessments, filter));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
