use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute every record must carry to say what kind of telemetry it is.
pub const EVENT_TYPE_ATTRIBUTE: &str = "event_type";

/// Discriminator used to select the records relevant to a metric (e.g. `failure_event`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelemetryType(String);

impl TelemetryType {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TelemetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TelemetryType {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

/// A single timestamped telemetry event. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRecord {
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source_type: String,
}

impl TelemetryRecord {
    pub fn new(kind: impl Into<String>, timestamp: DateTime<Utc>, source_type: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(EVENT_TYPE_ATTRIBUTE.to_string(), Value::String(kind.into()));
        Self {
            attributes,
            timestamp,
            source_type: source_type.into(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The record's kind, read from its `event_type` attribute.
    pub fn kind(&self) -> Option<TelemetryType> {
        match self.attributes.get(EVENT_TYPE_ATTRIBUTE) {
            Some(Value::String(kind)) if !kind.is_empty() => Some(TelemetryType::new(kind.as_str())),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind().is_some()
    }
}
