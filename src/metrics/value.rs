use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Field a structured value exposes to be scored.
pub const SCORE_FIELD: &str = "score";

/// What a metric computes: a number, a flag, or a structured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Boolean(bool),
    Record(BTreeMap<String, Value>),
}

impl MetricValue {
    /// Total mapping from any value to the number the engine aggregates.
    pub fn score(&self) -> f64 {
        match self {
            MetricValue::Number(x) if x.is_finite() => *x,
            MetricValue::Number(_) => 0.0,
            MetricValue::Boolean(true) => 1.0,
            MetricValue::Boolean(false) => 0.0,
            MetricValue::Record(fields) => fields
                .get(SCORE_FIELD)
                .and_then(Value::as_f64)
                .filter(|x| x.is_finite())
                .unwrap_or(0.0),
        }
    }
}

impl From<f64> for MetricValue {
    fn from(x: f64) -> Self {
        MetricValue::Number(x)
    }
}

impl From<bool> for MetricValue {
    fn from(b: bool) -> Self {
        MetricValue::Boolean(b)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(x) => write!(f, "{}", x),
            MetricValue::Boolean(b) => write!(f, "{}", b),
            MetricValue::Record(fields) => {
                let json = serde_json::to_string(fields).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}
