pub mod assessment;
pub mod config;
pub mod error;
pub mod events;
pub mod goals;
pub mod metrics;
pub mod progress;
pub mod service;
pub mod telemetry;

// Re-export the pipeline entry points for convenient access
pub use assessment::AssessmentEngine;
pub use error::{ConfigurationError, MetricError, QualityError, StorageError};
pub use goals::{Assessment, Goal};
pub use metrics::{Metric, MetricValue, MetricsService};
pub use service::QualityAssessmentService;
pub use telemetry::{TelemetryRecord, TelemetryStore};
