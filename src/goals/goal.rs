use std::sync::Arc;
use tracing::{debug, warn};

use super::assessment::{Assessment, GoalProfile, MetricProfile};
use crate::metrics::Metric;

/// A metric as referenced by a goal, with its weight inside that goal.
#[derive(Debug, Clone)]
pub struct GoalMetric {
    pub metric: Arc<Metric>,
    pub weight: f64,
}

/// A weighted grouping of metrics for one quality characteristic.
///
/// Weight is relative among sibling goals. History is append-only.
#[derive(Debug, Clone)]
pub struct Goal {
    name: String,
    description: String,
    weight: f64,
    metrics: Vec<GoalMetric>,
    history: Vec<Assessment>,
}

fn clamp_weight(weight: f64, what: &str) -> f64 {
    if weight.is_finite() && (0.0..=1.0).contains(&weight) {
        weight
    } else {
        let clamped = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
        warn!(what, weight, clamped, "weight outside [0, 1]");
        clamped
    }
}

impl Goal {
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        let name = name.into();
        let weight = clamp_weight(weight, &name);
        Self {
            name,
            description: description.into(),
            weight,
            metrics: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_metric(self, metric: Arc<Metric>) -> Self {
        self.with_weighted_metric(metric, 1.0)
    }

    /// Metric weights must be non-negative; they are normalised by the engine.
    pub fn with_weighted_metric(mut self, metric: Arc<Metric>, weight: f64) -> Self {
        let weight = if weight.is_finite() && weight >= 0.0 {
            weight
        } else {
            warn!(goal = %self.name, metric = metric.name(), weight, "invalid metric weight, using 0");
            0.0
        };
        self.metrics.push(GoalMetric { metric, weight });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn goal_metrics(&self) -> &[GoalMetric] {
        &self.metrics
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Arc<Metric>> {
        self.metrics.iter().map(|gm| &gm.metric)
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.history
    }

    pub fn latest_assessment(&self) -> Option<&Assessment> {
        self.history.last()
    }

    pub fn add_assessment(&mut self, assessment: Assessment) {
        if assessment.goal_name() != self.name {
            warn!(goal = %self.name, assessed = assessment.goal_name(), "attaching assessment scored for another goal");
        }
        debug!(goal = %self.name, assessment = %assessment.id(), score = assessment.global_score(), "assessment attached");
        self.history.push(assessment);
    }

    pub fn profile(&self) -> GoalProfile {
        GoalProfile {
            name: self.name.clone(),
            description: self.description.clone(),
            weight: self.weight,
            metrics: self
                .metrics()
                .map(|m| MetricProfile {
                    name: m.name().to_string(),
                    acronym: m.acronym().to_string(),
                    description: m.description().to_string(),
                    unit: m.unit().map(str::to_string),
                })
                .collect(),
        }
    }
}
