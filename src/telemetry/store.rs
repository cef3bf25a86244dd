use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{error, warn};

use super::record::{TelemetryRecord, TelemetryType};
use crate::error::StorageError;
use crate::goals::{Assessment, AssessmentFilter, AssessmentRecord};

pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Encoding of the backing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataFormat {
    #[default]
    Json,
    Csv,
    Xml,
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataFormat::Json => "JSON",
            DataFormat::Csv => "CSV",
            DataFormat::Xml => "XML",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEndpoint {
    pub uri: String,
}

/// Fixed for the lifetime of a store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryDataSourceConfig {
    pub storage_endpoint: StorageEndpoint,
    #[serde(default)]
    pub data_format: DataFormat,
}

impl TelemetryDataSourceConfig {
    pub fn new(uri: impl Into<String>, data_format: DataFormat) -> Self {
        Self {
            storage_endpoint: StorageEndpoint { uri: uri.into() },
            data_format,
        }
    }

    pub fn uri(&self) -> &str {
        &self.storage_endpoint.uri
    }
}

/// Everything a store holds: raw telemetry plus the persisted assessment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub telemetry_data: Vec<TelemetryRecord>,
    #[serde(default)]
    pub assessments: Vec<AssessmentRecord>,
    /// Entries present in the backing document that could not be decoded.
    #[serde(skip)]
    pub skipped_entries: usize,
}

impl StoreSnapshot {
    pub fn with_records(telemetry_data: Vec<TelemetryRecord>) -> Self {
        Self {
            telemetry_data,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.telemetry_data.is_empty() && self.assessments.is_empty()
    }

    /// Warns when the first record lacks its `event_type`. The snapshot is kept either way.
    pub fn validate(&self, location: &str) {
        if let Some(first) = self.telemetry_data.first() {
            if !first.is_valid() {
                warn!(location, "invalid telemetry data: first record has no event_type attribute");
            }
        }
    }

    pub fn append_assessments(&mut self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> usize {
        let before = self.assessments.len();
        self.assessments.extend(
            assessments
                .iter()
                .filter(|a| filter.map_or(true, |f| f.matches(a)))
                .map(AssessmentRecord::from),
        );
        self.assessments.len() - before
    }
}

/// Stored shape of a snapshot with every entry kept as raw JSON.
///
/// Backends read and rewrite this form so that one unreadable historical entry
/// neither hides the readable ones nor gets dropped on the next write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub telemetry_data: Vec<Value>,
    #[serde(default)]
    pub assessments: Vec<Value>,
}

impl StoreDocument {
    /// Blank content is an empty document. Anything that is not a JSON object of
    /// the expected shape is `Malformed`.
    pub fn parse(content: &str, location: &str) -> StoreResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content).map_err(|e| StorageError::Malformed {
            location: location.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn push_records(&mut self, records: &[TelemetryRecord]) -> StoreResult<()> {
        for record in records {
            self.telemetry_data.push(serde_json::to_value(record)?);
        }
        Ok(())
    }

    pub fn push_assessments(&mut self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> StoreResult<usize> {
        let mut added = 0;
        for assessment in assessments.iter().filter(|a| filter.map_or(true, |f| f.matches(a))) {
            self.assessments.push(serde_json::to_value(AssessmentRecord::from(assessment))?);
            added += 1;
        }
        Ok(added)
    }

    /// Decodes entries one at a time; the ones that fail are logged and counted.
    pub fn decode(&self, location: &str) -> StoreSnapshot {
        let (telemetry_data, bad_records) = decode_entries(&self.telemetry_data, location, "telemetry record");
        let (assessments, bad_assessments) = decode_entries(&self.assessments, location, "assessment");
        let snapshot = StoreSnapshot {
            telemetry_data,
            assessments,
            skipped_entries: bad_records + bad_assessments,
        };
        snapshot.validate(location);
        snapshot
    }
}

fn decode_entries<T: DeserializeOwned>(entries: &[Value], location: &str, what: &str) -> (Vec<T>, usize) {
    let mut decoded = Vec::with_capacity(entries.len());
    let mut skipped = 0;
    for (index, entry) in entries.iter().enumerate() {
        match serde_json::from_value(entry.clone()) {
            Ok(value) => decoded.push(value),
            Err(e) => {
                warn!(location, index, error = %e, "skipping unreadable {}", what);
                skipped += 1;
            }
        }
    }
    (decoded, skipped)
}

/// Persistence boundary for telemetry and assessment history.
///
/// Backends own the encoding; the pipeline only sees records. Writes are
/// read-modify-write and not atomic: one writer per store instance.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Opens a session. No-op for backends that need none.
    async fn connect(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Reads the whole store. A missing resource yields an empty snapshot and a warning;
    /// unparseable content is an error.
    async fn read(&self) -> StoreResult<StoreSnapshot>;

    /// Reads only records whose kind is in `kinds`.
    async fn read_kinds(&self, kinds: &BTreeSet<TelemetryType>) -> StoreResult<Vec<TelemetryRecord>> {
        let snapshot = self.read().await?;
        Ok(snapshot
            .telemetry_data
            .into_iter()
            .filter(|record| record.kind().map_or(false, |kind| kinds.contains(&kind)))
            .collect())
    }

    async fn store(&self, record: TelemetryRecord) -> StoreResult<()> {
        self.store_all(vec![record]).await
    }

    async fn store_all(&self, records: Vec<TelemetryRecord>) -> StoreResult<()>;

    /// Persists the normalized projection of each assessment that passes `filter`.
    async fn store_assessments(&self, assessments: &[Assessment], filter: Option<&AssessmentFilter>) -> StoreResult<()>;

    /// Short name for logs.
    fn describe(&self) -> String;
}

/// Reads `kinds` from `store`, logging failures and falling back to no records.
///
/// A corrupt store and an absent one look the same to the caller here; only the
/// log line tells them apart.
pub async fn read_kinds_or_empty(store: &dyn TelemetryStore, kinds: &BTreeSet<TelemetryType>) -> Vec<TelemetryRecord> {
    match store.read_kinds(kinds).await {
        Ok(records) => records,
        Err(e) => {
            error!(store = %store.describe(), error = %e, "failed to read telemetry, continuing with none");
            Vec::new()
        }
    }
}
