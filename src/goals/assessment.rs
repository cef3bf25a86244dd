use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Goal metadata captured at scoring time, detached from the live goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProfile {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub metrics: Vec<MetricProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProfile {
    pub name: String,
    pub acronym: String,
    pub description: String,
    pub unit: Option<String>,
}

/// Why a referenced metric contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapReason {
    /// Not present in the computed batch.
    NotComputed,
    /// Present but its computation failed.
    Failed(String),
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::NotComputed => f.write_str("not computed"),
            GapReason::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentGap {
    pub metric: String,
    pub reason: GapReason,
}

/// The result of scoring one goal at one point in time. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    id: Uuid,
    goal: GoalProfile,
    global_score: f64,
    timestamp: DateTime<Utc>,
    details: BTreeMap<String, f64>,
    gaps: Vec<AssessmentGap>,
}

impl Assessment {
    pub(crate) fn new(
        goal: GoalProfile,
        global_score: f64,
        timestamp: DateTime<Utc>,
        details: BTreeMap<String, f64>,
        gaps: Vec<AssessmentGap>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal,
            global_score,
            timestamp,
            details,
            gaps,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn goal(&self) -> &GoalProfile {
        &self.goal
    }

    pub fn goal_name(&self) -> &str {
        &self.goal.name
    }

    pub fn global_score(&self) -> f64 {
        self.global_score
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Contribution per metric name. Gaps appear here with `0.0`.
    pub fn details(&self) -> &BTreeMap<String, f64> {
        &self.details
    }

    pub fn gaps(&self) -> &[AssessmentGap] {
        &self.gaps
    }

    pub fn is_degraded(&self) -> bool {
        !self.gaps.is_empty()
    }
}

/// Persisted shape of an assessment; the compatibility contract for every backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub goal: GoalProfile,
    pub global_score: f64,
    pub timestamp: DateTime<Utc>,
    pub details: BTreeMap<String, f64>,
}

impl From<&Assessment> for AssessmentRecord {
    fn from(assessment: &Assessment) -> Self {
        Self {
            goal: assessment.goal.clone(),
            global_score: assessment.global_score,
            timestamp: assessment.timestamp,
            details: assessment.details.clone(),
        }
    }
}

/// Selects which assessments `store_assessments` persists. Empty filter keeps all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssessmentFilter {
    pub goals: Option<BTreeSet<String>>,
    pub since: Option<DateTime<Utc>>,
}

impl AssessmentFilter {
    pub fn for_goals<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            goals: Some(names.into_iter().map(Into::into).collect()),
            since: None,
        }
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn matches(&self, assessment: &Assessment) -> bool {
        let goal_ok = self
            .goals
            .as_ref()
            .map_or(true, |names| names.contains(assessment.goal_name()));
        let time_ok = self.since.map_or(true, |since| assessment.timestamp >= since);
        goal_ok && time_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn assessment(goal: &str, at: DateTime<Utc>) -> Assessment {
        let profile = GoalProfile {
            name: goal.to_string(),
            description: String::new(),
            weight: 0.5,
            metrics: vec![MetricProfile {
                name: "MTBF".to_string(),
                acronym: "MTBF".to_string(),
                description: "mean time between failures".to_string(),
                unit: Some("hours".to_string()),
            }],
        };
        let mut details = BTreeMap::new();
        details.insert("MTBF".to_string(), 120.0);
        Assessment::new(profile, 120.0, at, details, Vec::new())
    }

    #[test]
    fn record_uses_persisted_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let record = AssessmentRecord::from(&assessment("Reliability", at));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["globalScore"], 120.0);
        assert_eq!(json["details"]["MTBF"], 120.0);
        assert_eq!(json["goal"]["name"], "Reliability");
        assert_eq!(json["goal"]["metrics"][0]["unit"], "hours");
    }

    #[test]
    fn filter_by_goal_and_time() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let filter = AssessmentFilter::for_goals(["Reliability"]).since(at);

        assert!(filter.matches(&assessment("Reliability", at)));
        assert!(!filter.matches(&assessment("Reliability", at - Duration::seconds(1))));
        assert!(!filter.matches(&assessment("Security", at)));
        assert!(AssessmentFilter::default().matches(&assessment("Security", at)));
    }
}
