//! Stock formulas: counts, mean time between events, and event rate.
//!
//! Each formula sees only the records of the kinds its metric declares, so none
//! of them filter by kind themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metric::{Metric, MetricFormula};
use super::value::MetricValue;
use crate::error::MetricError;
use crate::telemetry::TelemetryRecord;

const SECONDS_PER_HOUR: f64 = 3_600.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Formula identifiers accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockFormula {
    EventCount,
    MeanTimeBetween,
    EventRate,
}

impl StockFormula {
    pub fn unit(&self) -> &'static str {
        match self {
            StockFormula::EventCount => "events",
            StockFormula::MeanTimeBetween => "hours",
            StockFormula::EventRate => "events/day",
        }
    }

    pub fn build(self, name: impl Into<String>, description: impl Into<String>) -> Metric {
        let metric = match self {
            StockFormula::EventCount => Metric::new(name, description, EventCount),
            StockFormula::MeanTimeBetween => Metric::new(name, description, MeanTimeBetween),
            StockFormula::EventRate => Metric::new(name, description, EventRate),
        };
        metric.with_unit(self.unit())
    }
}

fn sorted_timestamps(data: &[TelemetryRecord]) -> Vec<DateTime<Utc>> {
    let mut stamps: Vec<_> = data.iter().map(|r| r.timestamp).collect();
    stamps.sort();
    stamps
}

/// Number of records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventCount;

impl MetricFormula for EventCount {
    fn compute(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError> {
        Ok(MetricValue::Number(data.len() as f64))
    }
}

/// Mean hours between consecutive records. Needs two records at least.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanTimeBetween;

impl MetricFormula for MeanTimeBetween {
    fn compute(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError> {
        if data.len() < 2 {
            return Err(MetricError::InsufficientTelemetry {
                needed: 2,
                found: data.len(),
            });
        }
        let stamps = sorted_timestamps(data);
        let total_seconds: i64 = stamps
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).num_seconds())
            .sum();
        let gaps = (stamps.len() - 1) as f64;
        Ok(MetricValue::Number(total_seconds as f64 / gaps / SECONDS_PER_HOUR))
    }
}

/// Records per day across the observed span. A span under one day counts as one day.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRate;

impl MetricFormula for EventRate {
    fn compute(&self, data: &[TelemetryRecord]) -> Result<MetricValue, MetricError> {
        let stamps = sorted_timestamps(data);
        let (first, last) = match (stamps.first(), stamps.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(MetricValue::Number(0.0)),
        };
        let days = ((last - first).num_seconds() as f64 / SECONDS_PER_DAY).max(1.0);
        Ok(MetricValue::Number(stamps.len() as f64 / days))
    }
}
