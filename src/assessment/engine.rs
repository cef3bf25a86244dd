use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::goals::{Assessment, AssessmentGap, GapReason, Goal};
use crate::metrics::{MetricOutcome, MetricResult};

/// Score of a goal with no metrics to score.
pub const NEUTRAL_SCORE: f64 = 0.0;

/// Scores goals against computed metrics. Pure: goals are only read.
#[derive(Debug, Default, Clone)]
pub struct AssessmentEngine;

impl AssessmentEngine {
    pub fn new() -> Self {
        Self
    }

    /// One assessment per goal, in input order, stamped with the current time.
    pub fn assess_goals(&self, goals: &[Goal], metrics: &[MetricResult]) -> Vec<Assessment> {
        self.assess_goals_at(goals, metrics, Utc::now())
    }

    pub fn assess_goals_at(&self, goals: &[Goal], metrics: &[MetricResult], at: DateTime<Utc>) -> Vec<Assessment> {
        // First result wins when a name shows up twice.
        let mut by_name: HashMap<&str, &MetricResult> = HashMap::new();
        for result in metrics {
            by_name.entry(result.name()).or_insert(result);
        }

        goals.iter().map(|goal| self.assess_goal(goal, &by_name, at)).collect()
    }

    fn assess_goal(&self, goal: &Goal, metrics: &HashMap<&str, &MetricResult>, at: DateTime<Utc>) -> Assessment {
        let weights = normalized_weights(goal);
        let mut details = BTreeMap::new();
        let mut gaps = Vec::new();
        let mut global_score = NEUTRAL_SCORE;

        for (goal_metric, weight) in goal.goal_metrics().iter().zip(weights) {
            let name = goal_metric.metric.name();
            let contribution = match metrics.get(name).map(|r| &r.outcome) {
                Some(MetricOutcome::Computed(value)) => contribution(value.score(), weight),
                Some(MetricOutcome::Failed(e)) => {
                    gaps.push(AssessmentGap {
                        metric: name.to_string(),
                        reason: GapReason::Failed(e.to_string()),
                    });
                    0.0
                }
                None => {
                    gaps.push(AssessmentGap {
                        metric: name.to_string(),
                        reason: GapReason::NotComputed,
                    });
                    0.0
                }
            };
            // A metric listed twice in a goal contributes twice.
            *details.entry(name.to_string()).or_insert(0.0) += contribution;
            global_score += contribution;
        }

        debug!(goal = goal.name(), score = global_score, gaps = gaps.len(), "goal assessed");
        Assessment::new(goal.profile(), global_score, at, details, gaps)
    }

    /// Goal-weight-weighted mean of the global scores. Zero total weight gives the neutral score.
    pub fn overall_score(&self, goals: &[Goal], assessments: &[Assessment]) -> f64 {
        let weights: HashMap<&str, f64> = goals.iter().map(|g| (g.name(), g.weight())).collect();
        let (weighted, total) = assessments.iter().fold((0.0, 0.0), |(weighted, total), a| {
            let weight = weights.get(a.goal_name()).copied().unwrap_or(0.0);
            (weighted + a.global_score() * weight, total + weight)
        });
        if total > 0.0 {
            weighted / total
        } else {
            NEUTRAL_SCORE
        }
    }
}

/// Contribution of one metric: its score scaled by its normalised weight in the goal.
pub fn contribution(score: f64, weight: f64) -> f64 {
    let c = score * weight;
    if c.is_finite() {
        c
    } else {
        0.0
    }
}

/// Metric weights of `goal` scaled to sum to 1. All-zero weights become equal weights.
fn normalized_weights(goal: &Goal) -> Vec<f64> {
    let metrics = goal.goal_metrics();
    if metrics.is_empty() {
        return Vec::new();
    }
    let total: f64 = metrics.iter().map(|m| m.weight).sum();
    if total > 0.0 {
        metrics.iter().map(|m| m.weight / total).collect()
    } else {
        vec![1.0 / metrics.len() as f64; metrics.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetricError;
    use crate::metrics::{Metric, MetricValue, StockFormula};
    use std::sync::Arc;

    fn metric(name: &str) -> Arc<Metric> {
        Arc::new(StockFormula::EventCount.build(name, name))
    }

    fn computed(metric: &Arc<Metric>, value: f64) -> MetricResult {
        MetricResult {
            metric: Arc::clone(metric),
            outcome: MetricOutcome::Computed(MetricValue::Number(value)),
        }
    }

    #[test]
    fn weighted_sum_of_scores() {
        let a = metric("A");
        let b = metric("B");
        let goal = Goal::new("G", "", 1.0)
            .with_weighted_metric(Arc::clone(&a), 3.0)
            .with_weighted_metric(Arc::clone(&b), 1.0);

        let assessments = AssessmentEngine::new().assess_goals(&[goal], &[computed(&a, 1.0), computed(&b, 2.0)]);
        let assessment = &assessments[0];

        assert_eq!(assessment.details()["A"], 0.75);
        assert_eq!(assessment.details()["B"], 0.5);
        assert_eq!(assessment.global_score(), 1.25);
        assert!(!assessment.is_degraded());
    }

    #[test]
    fn missing_and_failed_metrics_are_zero_gaps() {
        let a = metric("A");
        let b = metric("B");
        let c = metric("C");
        let goal = Goal::new("G", "", 1.0)
            .with_metric(Arc::clone(&a))
            .with_metric(Arc::clone(&b))
            .with_metric(Arc::clone(&c));

        let failed = MetricResult {
            metric: Arc::clone(&b),
            outcome: MetricOutcome::Failed(MetricError::Computation("nope".to_string())),
        };
        let assessments = AssessmentEngine::new().assess_goals(&[goal], &[computed(&a, 3.0), failed]);
        let assessment = &assessments[0];

        assert_eq!(assessment.global_score(), 1.0);
        assert_eq!(assessment.details()["B"], 0.0);
        assert_eq!(assessment.details()["C"], 0.0);
        assert_eq!(assessment.gaps().len(), 2);
        assert_eq!(assessment.gaps()[1].reason, GapReason::NotComputed);
    }

    #[test]
    fn one_assessment_per_goal_in_order() {
        let a = metric("A");
        let goals = vec![
            Goal::new("empty", "", 0.2),
            Goal::new("scored", "", 0.8).with_metric(Arc::clone(&a)),
        ];
        let assessments = AssessmentEngine::new().assess_goals(&goals, &[computed(&a, 4.0)]);

        let names: Vec<_> = assessments.iter().map(|a| a.goal_name()).collect();
        assert_eq!(names, ["empty", "scored"]);
        assert_eq!(assessments[0].global_score(), NEUTRAL_SCORE);
        assert!(assessments[0].details().is_empty());
        assert_eq!(assessments[1].global_score(), 4.0);
    }

    #[test]
    fn zero_metric_weights_fall_back_to_equal() {
        let a = metric("A");
        let b = metric("B");
        let goal = Goal::new("G", "", 1.0)
            .with_weighted_metric(Arc::clone(&a), 0.0)
            .with_weighted_metric(Arc::clone(&b), 0.0);
        let assessments = AssessmentEngine::new().assess_goals(&[goal], &[computed(&a, 2.0), computed(&b, 4.0)]);
        assert_eq!(assessments[0].global_score(), 3.0);
    }

    #[test]
    fn overall_score_uses_goal_weights() {
        let a = metric("A");
        let goals = vec![
            Goal::new("low", "", 0.25).with_metric(Arc::clone(&a)),
            Goal::new("none", "", 0.75),
        ];
        let engine = AssessmentEngine::new();
        let assessments = engine.assess_goals(&goals, &[computed(&a, 4.0)]);
        assert_eq!(engine.overall_score(&goals, &assessments), 1.0);
        assert_eq!(engine.overall_score(&[], &assessments), NEUTRAL_SCORE);
    }

    #[test]
    fn scoring_does_not_touch_goals() {
        let a = metric("A");
        let goal = Goal::new("G", "", 1.0).with_metric(Arc::clone(&a));
        let goals = vec![goal];
        AssessmentEngine::new().assess_goals(&goals, &[computed(&a, 1.0)]);
        assert!(goals[0].assessments().is_empty());
    }
}
