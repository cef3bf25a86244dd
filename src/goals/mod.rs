//! Goals and the assessments that accumulate on them.

pub mod assessment;
pub mod goal;

pub use assessment::{
    Assessment, AssessmentFilter, AssessmentGap, AssessmentRecord, GapReason, GoalProfile, MetricProfile,
};
pub use goal::{Goal, GoalMetric};
