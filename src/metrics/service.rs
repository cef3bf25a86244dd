use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{instrument, warn};

use super::metric::Metric;
use super::value::MetricValue;
use crate::error::{ConfigurationError, MetricError, Result};
use crate::events::EventChannel;
use crate::progress::ProgressTracker;
use crate::telemetry::{read_kinds_or_empty, TelemetryStore, TelemetryType};

#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Computed(MetricValue),
    Failed(MetricError),
}

/// Keeps the first metric of each name. A different instance under a taken name is
/// dropped with a warning, since results are keyed by name.
fn dedupe_by_name(metrics: &[Arc<Metric>]) -> Vec<Arc<Metric>> {
    let mut seen: BTreeMap<&str, &Arc<Metric>> = BTreeMap::new();
    let mut unique = Vec::with_capacity(metrics.len());
    for metric in metrics {
        match seen.get(metric.name()) {
            Some(first) if Arc::ptr_eq(first, metric) => {}
            Some(first) => warn!(
                metric = metric.name(),
                kept = ?first.required_telemetry(),
                dropped = ?metric.required_telemetry(),
                "two distinct metrics share a name, computing only the first"
            ),
            None => {
                seen.insert(metric.name(), metric);
                unique.push(Arc::clone(metric));
            }
        }
    }
    unique
}

/// One metric after a compute pass, with its value or its failure.
#[derive(Debug, Clone)]
pub struct MetricResult {
    pub metric: Arc<Metric>,
    pub outcome: MetricOutcome,
}

impl MetricResult {
    pub fn name(&self) -> &str {
        self.metric.name()
    }

    pub fn value(&self) -> Option<&MetricValue> {
        match &self.outcome {
            MetricOutcome::Computed(value) => Some(value),
            MetricOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, MetricOutcome::Failed(_))
    }
}

/// Union of the telemetry kinds `metrics` declare.
pub fn required_kinds(metrics: &[Arc<Metric>]) -> BTreeSet<TelemetryType> {
    metrics
        .iter()
        .flat_map(|m| m.required_telemetry().iter().cloned())
        .collect()
}

/// Computes metrics from a telemetry source and broadcasts the results.
pub struct MetricsService {
    progress: RwLock<Option<Arc<dyn ProgressTracker>>>,
    updates: EventChannel<Vec<MetricResult>>,
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            progress: RwLock::new(None),
            updates: EventChannel::new("metrics-updated"),
        }
    }

    pub fn set_progress_tracker(&self, tracker: Arc<dyn ProgressTracker>) {
        *self.progress.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tracker);
    }

    fn progress_tracker(&self) -> Result<Arc<dyn ProgressTracker>> {
        self.progress
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| ConfigurationError::ProgressTracker.into())
    }

    /// Invoked once per completed `compute_metrics` call, in registration order.
    pub fn on_metrics_updated<F>(&self, listener: F)
    where
        F: Fn(&Vec<MetricResult>) + Send + Sync + 'static,
    {
        self.updates.subscribe(listener);
    }

    pub fn updates(&self) -> &EventChannel<Vec<MetricResult>> {
        &self.updates
    }

    /// Fetches the telemetry `metrics` need and computes each of them.
    ///
    /// Metrics listed twice (shared between goals) are computed once. A failing metric
    /// is reported in its result and never aborts the batch; storage failures degrade
    /// to an empty batch. Only a missing progress tracker fails the call.
    #[instrument(skip_all, fields(store = %source.describe(), metrics = metrics.len()))]
    pub async fn compute_metrics(&self, source: &dyn TelemetryStore, metrics: &[Arc<Metric>]) -> Result<Vec<MetricResult>> {
        let progress = self.progress_tracker()?;

        let metrics = dedupe_by_name(metrics);

        // 1. Only the kinds some metric declares
        let kinds = required_kinds(&metrics);
        progress.notify_progress(&format!(
            "Metrics Service: fetching telemetry for {} kind(s)...",
            kinds.len()
        ));

        // 2. Fetch
        let records = if kinds.is_empty() {
            Vec::new()
        } else {
            read_kinds_or_empty(source, &kinds).await
        };
        progress.notify_progress(&format!(
            "Metrics Service: fetched {} record(s), computing {} metric(s)...",
            records.len(),
            metrics.len()
        ));

        // 3. Compute, isolating failures
        let mut results = Vec::with_capacity(metrics.len());
        for metric in &metrics {
            let batch: Vec<_> = records.iter().filter(|r| metric.reads(r)).cloned().collect();
            let outcome = match metric.compute_value(&batch) {
                Ok(value) => MetricOutcome::Computed(value),
                Err(e) => {
                    warn!(metric = metric.name(), error = %e, "metric computation failed");
                    MetricOutcome::Failed(e)
                }
            };
            results.push(MetricResult {
                metric: Arc::clone(metric),
                outcome,
            });
        }

        let failed = results.iter().filter(|r| r.is_failed()).count();
        progress.notify_progress(&format!(
            "Metrics Service: computed {} metric(s), {} failed.",
            results.len() - failed,
            failed
        ));

        // 4. Broadcast
        self.updates.publish(results.clone());
        Ok(results)
    }
}
