//! Metrics: named, deterministic computations over telemetry batches.

pub mod metric;
pub mod service;
pub mod stock;
pub mod value;

pub use metric::{Metric, MetricFormula};
pub use service::{required_kinds, MetricOutcome, MetricResult, MetricsService};
pub use stock::{EventCount, EventRate, MeanTimeBetween, StockFormula};
pub use value::MetricValue;
